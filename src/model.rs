//! # Model Module
//!
//! The boundary between the orchestrator and a generative model. The
//! orchestrator speaks only in the closed types defined here; each backend owns
//! its own wire format and never lets untyped payloads past this seam.
//!
//! ## Key Components
//!
//! - `ModelBackend`: One generation call against a named model
//! - `GeminiBackend`: `generateContent` on the Gemini Developer API
//! - `Conversation`, `Turn`, `Part`: Accumulated conversation state
//! - `Generation`: Text, tool calls and token usage of one call

mod gemini;
#[cfg(test)]
pub(crate) mod mock_model;
mod types;

use std::future::Future;

use crate::error::Result;

pub use gemini::GeminiBackend;
pub use types::{
    Attachment, Conversation, Generation, GenerationOptions, Part, Role, TokenUsage, ToolCall,
    ToolDeclaration, Turn,
};

/// A generative model reachable by name
///
/// Failures carry a classifiable [`crate::Error`]; see [`crate::Error::kind`].
pub trait ModelBackend: Send + Sync {
    /// Generate the next model turn for `conversation`.
    ///
    /// `tools` is `None` when tool calling is disabled for this call.
    fn generate(
        &self,
        model: &str,
        conversation: &Conversation,
        tools: Option<&[ToolDeclaration]>,
        options: &GenerationOptions,
    ) -> impl Future<Output = Result<Generation>> + Send;
}
