//! # parley - quota-aware orchestration for Gemini chat bots
//!
//! This crate answers chat messages with a Gemini model while staying inside
//! free-tier limits. It picks the best model that still has room, lets the model
//! call tools (character counting and a budgeted web search), caches tool-free
//! answers for a few minutes, and shapes the final text into messages that fit a
//! chat platform's length limit.
//!
//! ## Features
//!
//! - Per-model request/token counters in fixed minute and day windows, checked
//!   against configured limits scaled by a safety buffer
//! - Priority-ordered model fallback and per-model status reporting
//! - A monthly free-quota gate for web search
//! - A bounded tool-calling loop with cancellation and per-call timeouts
//! - Markdown-aware message splitting, or model-side compression
//! - Counter stores in memory or in a libSQL file shared across restarts
//! - Hot-reloadable JSON configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use parley::config::{ConfigHandle, Settings};
//! use parley::delivery::DeliveryStrategy;
//! use parley::model::GeminiBackend;
//! use parley::orchestrator::{GenerationRequest, Orchestrator};
//! use parley::quota::SearchQuotaGate;
//! use parley::search::BraveSearch;
//! use parley::store::MemoryStore;
//! use parley::tools::BuiltinTools;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigHandle::new(Settings::default())?;
//!     let store = Arc::new(MemoryStore::new());
//!     let tools = BuiltinTools::new(
//!         Arc::new(BraveSearch::new("brave-key")?),
//!         SearchQuotaGate::new(store.clone(), config.clone()),
//!         config.clone(),
//!     );
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(GeminiBackend::new("gemini-key")?),
//!         Arc::new(tools),
//!         store,
//!         config,
//!     );
//!
//!     let request = GenerationRequest::new("You are a helpful bot.", "What's new in Rust?");
//!     let (answer, plan) = orchestrator.respond(&request, DeliveryStrategy::Split).await?;
//!     println!("answered by {}", answer.model);
//!     for chunk in plan.chunks {
//!         println!("{}", chunk);
//!     }
//!     Ok(())
//! }
//! ```

mod error;

pub mod cache;
pub mod config;
pub mod delivery;
pub mod model;
pub mod orchestrator;
pub mod quota;
pub mod search;
pub mod store;
pub mod tools;

pub use error::{BackendErrorKind, Error, Result};

/// Re-export of the commonly used types
pub mod prelude {
    pub use crate::config::{ConfigHandle, Settings};
    pub use crate::delivery::{DeliveryPlan, DeliveryStrategy};
    pub use crate::error::{BackendErrorKind, Error, Result};
    pub use crate::orchestrator::{Answer, GenerationRequest, Orchestrator, RunError};
}
