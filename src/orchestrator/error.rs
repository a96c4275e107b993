use thiserror::Error;

use crate::error::{BackendErrorKind, Error};

/// Why a run produced no answer
#[derive(Error, Debug)]
pub enum RunError {
    /// Every candidate model is at its rate limit
    #[error("No model available: every configured model is at its rate limit")]
    QuotaExceeded,

    /// The model kept calling tools past the iteration cap
    #[error("Tool loop reached its limit of {0} model calls")]
    OrchestrationLimitExceeded(usize),

    /// The model backend failed
    #[error("Model backend error: {source}")]
    Backend {
        kind: BackendErrorKind,
        #[source]
        source: Error,
    },

    /// A model name with no configured limits
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The caller cancelled the run
    #[error("Run cancelled")]
    Cancelled,
}

impl From<Error> for RunError {
    fn from(err: Error) -> Self {
        match err {
            Error::UnknownModel(model) => RunError::UnknownModel(model),
            source => RunError::Backend {
                kind: source.kind(),
                source,
            },
        }
    }
}

impl RunError {
    /// Whether the caller should say "try again later" rather than "something went wrong"
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            RunError::QuotaExceeded
                | RunError::Backend {
                    kind: BackendErrorKind::Quota,
                    ..
                }
        )
    }

    /// Text suitable for showing to the person who asked
    pub fn user_message(&self) -> &'static str {
        match self {
            RunError::Cancelled => "The request was cancelled.",
            _ if self.is_retryable_later() => {
                "I'm out of capacity right now. Please try again in a minute."
            }
            _ => "Something went wrong while generating a response. Please try again.",
        }
    }
}
