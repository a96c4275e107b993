//! Tools the model can call during a run
//!
//! The orchestrator talks to tools only through [`ToolExecutor`]. The built-in
//! set covers the two tools a chat answer needs:
//!
//! - `count_characters`: Measures a draft against the platform message limit
//! - `web_search`: Searches the web, within the monthly search budget
//!
//! A tool never aborts a run. Failures come back as [`ToolError`] and are handed
//! to the model as `{"error": {"kind": ..., "message": ...}}` so it can adapt.

mod builtin;
mod char_count;
mod error;
mod schema;
mod web_search;

use std::future::Future;

use serde_json::Value;

use crate::model::{ToolCall, ToolDeclaration};

pub use builtin::BuiltinTools;
pub use char_count::{CharacterCount, CountCharactersArgs, count_characters};
pub use error::ToolError;
pub use web_search::WebSearchArgs;

pub const COUNT_CHARACTERS: &str = "count_characters";
pub const WEB_SEARCH: &str = "web_search";

/// Executes the tool calls a model emits
pub trait ToolExecutor: Send + Sync {
    /// Tools to offer the model this turn
    fn declarations(&self, search_available: bool) -> Vec<ToolDeclaration>;

    /// Run one call and return its JSON result
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;
}
