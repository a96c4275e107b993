//! Priority-ordered model selection.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::tracker::{CapacitySnapshot, RateLimitTracker};
use crate::store::CounterStore;

/// Measured state of one model
///
/// A failed measurement is reported as `Unknown`, never as available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelStatus {
    Available(CapacitySnapshot),
    Exhausted(CapacitySnapshot),
    Unknown { model: String, reason: String },
}

impl ModelStatus {
    pub fn model(&self) -> &str {
        match self {
            ModelStatus::Available(s) | ModelStatus::Exhausted(s) => &s.model,
            ModelStatus::Unknown { model, .. } => model,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ModelStatus::Available(_))
    }

    pub fn snapshot(&self) -> Option<&CapacitySnapshot> {
        match self {
            ModelStatus::Available(s) | ModelStatus::Exhausted(s) => Some(s),
            ModelStatus::Unknown { .. } => None,
        }
    }
}

/// Picks the first admissible model from a caller-ordered list
pub struct ModelSelector<C> {
    tracker: RateLimitTracker<C>,
}

impl<C> Clone for ModelSelector<C> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
        }
    }
}

impl<C: CounterStore> ModelSelector<C> {
    pub fn new(tracker: RateLimitTracker<C>) -> Self {
        Self { tracker }
    }

    /// First model in `priority` that is admissible right now.
    ///
    /// A model whose capacity cannot be read is skipped. `None` means every
    /// candidate is exhausted or unreadable.
    #[instrument(skip(self))]
    pub async fn select_model(&self, priority: &[String]) -> Option<String> {
        for model in priority {
            match self.tracker.admissible(model).await {
                Ok(true) => {
                    debug!(model = %model, "selected model");
                    return Some(model.clone());
                }
                Ok(false) => debug!(model = %model, "model exhausted, trying next"),
                Err(e) => warn!(model = %model, error = %e, "capacity check failed, skipping model"),
            }
        }
        None
    }

    /// Status of every model in `models`, in the same order
    pub async fn status(&self, models: &[String]) -> Vec<ModelStatus> {
        join_all(models.iter().map(|model| async move {
            match self.tracker.capacity(model).await {
                Ok(snapshot) if snapshot.can_make_request => ModelStatus::Available(snapshot),
                Ok(snapshot) => ModelStatus::Exhausted(snapshot),
                Err(e) => ModelStatus::Unknown {
                    model: model.clone(),
                    reason: e.to_string(),
                },
            }
        }))
        .await
    }
}
