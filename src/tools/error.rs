use serde_json::{Value, json};
use thiserror::Error;

/// A tool call that could not produce a result
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Search quota exceeded: {used} of {free_quota} searches used this month")]
    QuotaExceeded { used: u64, free_quota: u64 },
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool {tool} timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },
    #[error("Backend error: {0}")]
    Backend(#[from] crate::error::Error),
}

impl ToolError {
    /// Stable identifier the model can branch on
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::QuotaExceeded { .. } => "quota_exceeded",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Backend(_) => "backend_error",
        }
    }

    /// The error as tool-result content
    pub fn to_response(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_kind_and_message() {
        let err = ToolError::QuotaExceeded {
            used: 2000,
            free_quota: 2000,
        };
        let response = err.to_response();
        assert_eq!(response["error"]["kind"], "quota_exceeded");
        assert_eq!(
            response["error"]["message"],
            "Search quota exceeded: 2000 of 2000 searches used this month"
        );
    }
}
