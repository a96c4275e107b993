//! # Quota Module
//!
//! Admission control for model and search calls. Nothing here holds counter
//! state in memory: every decision is a fresh read of the `CounterStore`, and
//! every limit is a fresh read of the live `ConfigHandle`, so a reload or a
//! second process sharing the store is seen on the next call.
//!
//! ## Key Components
//!
//! - `RateLimitTracker`: Per-model rpm/tpm/rpd usage, snapshots and recording
//! - `ModelSelector`: First admissible model from a priority list
//! - `SearchQuotaGate`: Monthly search budget
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::config::{ConfigHandle, Settings};
//! use parley::quota::{ModelSelector, RateLimitTracker, Usage};
//! use parley::store::MemoryStore;
//!
//! # async fn example() -> parley::Result<()> {
//! let config = ConfigHandle::new(Settings::default()).expect("valid settings");
//! let tracker = RateLimitTracker::new(Arc::new(MemoryStore::new()), config.clone());
//! let selector = ModelSelector::new(tracker.clone());
//!
//! if let Some(model) = selector.select_model(&config.current().priority_list()).await {
//!     tracker.record(&model, Usage::call(1200)).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod search_gate;
mod selector;
mod tracker;
mod window;

pub use search_gate::{SearchBudget, SearchQuotaGate};
pub use selector::{ModelSelector, ModelStatus};
pub use tracker::{CapacitySnapshot, MetricUsage, RateLimitTracker, Usage};
pub use window::{Metric, Window};

pub(crate) use window::now_ms;
