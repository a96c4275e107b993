//! Inputs and outputs of a run.

use serde::Serialize;

use crate::model::{Attachment, GenerationOptions, TokenUsage};

/// One inbound message to answer
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_message: String,
    /// Files sent with the user message. A request with attachments is never cached.
    pub attachments: Vec<Attachment>,
    pub tools_enabled: bool,
    /// Overrides the configured generation defaults
    pub options: Option<GenerationOptions>,
}

impl GenerationRequest {
    /// A request with tools enabled and no attachments
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            attachments: Vec::new(),
            tools_enabled: true,
            options: None,
        }
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// The final answer of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Model that produced the answer
    pub model: String,
    pub from_cache: bool,
    /// Tokens used across every model call of the run
    pub usage: TokenUsage,
    pub model_calls: usize,
    pub tool_calls: usize,
}
