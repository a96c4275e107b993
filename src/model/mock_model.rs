//! # Scripted Model for Testing
//!
//! `MockModel` implements [`ModelBackend`] by replaying a queue of prepared
//! results, so orchestrator tests can drive exact tool-calling sequences and
//! failure modes without a network. Every call is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use super::ModelBackend;
use super::types::{
    Conversation, Generation, GenerationOptions, TokenUsage, ToolCall, ToolDeclaration,
};
use crate::error::{Error, Result};

/// What the mock saw on one call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub conversation: Conversation,
    /// Names of the declared tools, `None` when tools were disabled
    pub tools: Option<Vec<String>>,
    pub options: GenerationOptions,
}

/// A model that returns scripted results in order
#[derive(Debug, Clone, Default)]
pub struct MockModel {
    script: Arc<Mutex<VecDeque<Result<Generation>>>>,
    /// Returned once the script is exhausted
    fallback: Arc<Mutex<Option<Generation>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    delay: Option<Duration>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_text(&self, text: &str, tokens: u64) {
        self.push(Ok(text_generation(text, tokens))).await;
    }

    pub async fn push_tool_call(&self, name: &str, arguments: Value, tokens: u64) {
        self.push(Ok(tool_generation(vec![ToolCall::new(name, arguments)], tokens)))
            .await;
    }

    pub async fn push_error(&self, error: Error) {
        self.push(Err(error)).await;
    }

    pub async fn push(&self, result: Result<Generation>) {
        self.script.lock().await.push_back(result);
    }

    /// Return `generation` for every call after the script runs out
    pub async fn repeat(&self, generation: Generation) {
        *self.fallback.lock().await = Some(generation);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

pub fn text_generation(text: &str, tokens: u64) -> Generation {
    Generation {
        text: text.to_string(),
        tool_calls: Vec::new(),
        usage: usage(tokens),
    }
}

pub fn tool_generation(tool_calls: Vec<ToolCall>, tokens: u64) -> Generation {
    Generation {
        text: String::new(),
        tool_calls,
        usage: usage(tokens),
    }
}

fn usage(total: u64) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total / 2,
        completion_tokens: total - total / 2,
        total_tokens: total,
    }
}

impl ModelBackend for MockModel {
    async fn generate(
        &self,
        model: &str,
        conversation: &Conversation,
        tools: Option<&[ToolDeclaration]>,
        options: &GenerationOptions,
    ) -> Result<Generation> {
        self.calls.lock().await.push(RecordedCall {
            model: model.to_string(),
            conversation: conversation.clone(),
            tools: tools.map(|t| t.iter().map(|d| d.name.clone()).collect()),
            options: *options,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().await.pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.fallback.lock().await.clone().unwrap_or_default()),
        }
    }
}
