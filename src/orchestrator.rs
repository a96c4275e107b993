//! # Generation Orchestrator
//!
//! Drives one inbound request from model selection to a final answer:
//!
//! 1. Pick the first admissible model from the configured priority list
//! 2. Serve tool-free requests from the response cache when possible
//! 3. Call the model, run any tool calls it makes in order, feed the results
//!    back, and repeat until it answers in plain text or the iteration cap hits
//!
//! Usage is recorded against the rate tracker after every model call, failed
//! or not. Tool failures go back to the model as tool results; every other
//! failure ends the run with a [`RunError`].
//!
//! ```text
//! SelectingModel -> Generating -> (AwaitingToolResults -> Generating)* -> Done
//!                        any state -> Failed
//! ```

mod error;
mod request;
mod run;

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::ConfigHandle;
use crate::model::ModelBackend;
use crate::quota::{ModelSelector, RateLimitTracker, SearchQuotaGate};
use crate::store::CounterStore;
use crate::tools::ToolExecutor;

pub use error::RunError;
pub use request::{Answer, GenerationRequest};
pub use run::RunState;

/// The tool-calling engine for one process
///
/// Cheap to share behind an `Arc`; every run borrows it immutably and runs can
/// proceed concurrently.
pub struct Orchestrator<M, T, C> {
    backend: Arc<M>,
    tools: Arc<T>,
    tracker: RateLimitTracker<C>,
    selector: ModelSelector<C>,
    gate: SearchQuotaGate<C>,
    cache: ResponseCache,
    config: ConfigHandle,
}

impl<M, T, C> Orchestrator<M, T, C>
where
    M: ModelBackend,
    T: ToolExecutor,
    C: CounterStore,
{
    pub fn new(backend: Arc<M>, tools: Arc<T>, store: Arc<C>, config: ConfigHandle) -> Self {
        let tracker = RateLimitTracker::new(Arc::clone(&store), config.clone());
        Self {
            backend,
            tools,
            selector: ModelSelector::new(tracker.clone()),
            gate: SearchQuotaGate::new(store, config.clone()),
            tracker,
            cache: ResponseCache::new(),
            config,
        }
    }

    /// Use a shared cache instead of a private one
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn tracker(&self) -> &RateLimitTracker<C> {
        &self.tracker
    }

    pub fn selector(&self) -> &ModelSelector<C> {
        &self.selector
    }

    pub fn gate(&self) -> &SearchQuotaGate<C> {
        &self.gate
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }
}
