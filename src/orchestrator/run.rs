//! The run loop.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{Answer, GenerationRequest, Orchestrator, RunError};
use crate::cache::{CachedResponse, ResponseCache};
use crate::delivery::{self, Compressor, DeliveryPlan, DeliveryStrategy};
use crate::error::Error;
use crate::model::{
    Conversation, Generation, GenerationOptions, ModelBackend, Part, TokenUsage, ToolCall,
    ToolDeclaration, Turn,
};
use crate::quota::Usage;
use crate::store::CounterStore;
use crate::tools::{ToolError, ToolExecutor};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    SelectingModel,
    Generating,
    AwaitingToolResults,
    Done,
    Failed,
}

fn advance(state: &mut RunState, next: RunState) {
    debug!(from = ?*state, to = ?next, "run state transition");
    *state = next;
}

fn user_turn(request: &GenerationRequest) -> Turn {
    let mut parts = vec![Part::Text(request.user_message.clone())];
    parts.extend(request.attachments.iter().cloned().map(Part::InlineData));
    Turn::user(parts)
}

fn model_turn(generation: &Generation) -> Turn {
    let mut parts = Vec::with_capacity(generation.tool_calls.len() + 1);
    if !generation.text.is_empty() {
        parts.push(Part::Text(generation.text.clone()));
    }
    parts.extend(generation.tool_calls.iter().cloned().map(Part::FunctionCall));
    Turn::model(parts)
}

fn compression_prompt(max_chars: usize) -> String {
    format!(
        "Rewrite the user's text so it is at most {} characters long. Keep the key facts, \
         code and formatting. Reply with the rewritten text only.",
        max_chars
    )
}

impl<M, T, C> Orchestrator<M, T, C>
where
    M: ModelBackend,
    T: ToolExecutor,
    C: CounterStore,
{
    /// Answer `request`
    pub async fn run(&self, request: &GenerationRequest) -> Result<Answer, RunError> {
        self.run_cancellable(request, &CancellationToken::new()).await
    }

    /// Answer `request`, giving up as soon as `cancel` fires.
    ///
    /// A model call abandoned by cancellation still counts as one request.
    #[instrument(skip_all, fields(
        tools_enabled = request.tools_enabled,
        attachments = request.attachments.len()
    ))]
    pub async fn run_cancellable(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Answer, RunError> {
        let mut state = RunState::SelectingModel;
        let result = self.drive(request, cancel, &mut state).await;
        match &result {
            Ok(answer) => {
                advance(&mut state, RunState::Done);
                info!(
                    model = %answer.model,
                    from_cache = answer.from_cache,
                    model_calls = answer.model_calls,
                    tool_calls = answer.tool_calls,
                    total_tokens = answer.usage.total_tokens,
                    "run finished"
                );
            }
            Err(e) => {
                warn!(state = ?state, error = %e, "run failed");
                advance(&mut state, RunState::Failed);
            }
        }
        result
    }

    /// Answer `request` and plan its delivery under the configured message limit
    pub async fn respond(
        &self,
        request: &GenerationRequest,
        strategy: DeliveryStrategy,
    ) -> Result<(Answer, DeliveryPlan), RunError> {
        let answer = self.run(request).await?;
        let limit = self.config.current().message_limit;
        let plan = delivery::plan(&answer.text, limit, strategy, self).await;
        Ok((answer, plan))
    }

    async fn drive(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<Answer, RunError> {
        let settings = self.config.current();
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let model = self
            .selector
            .select_model(&settings.priority_list())
            .await
            .ok_or(RunError::QuotaExceeded)?;
        let options = request
            .options
            .unwrap_or_else(|| GenerationOptions::from(&settings.generation));

        let cache_key = (!request.tools_enabled && request.attachments.is_empty()).then(|| {
            ResponseCache::key(
                &model,
                &request.system_prompt,
                &request.user_message,
                options.temperature,
                options.max_output_tokens,
            )
        });
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key).await {
                debug!(model = %hit.model, "served from cache");
                return Ok(Answer {
                    text: hit.text,
                    model: hit.model,
                    from_cache: true,
                    usage: TokenUsage::default(),
                    model_calls: 0,
                    tool_calls: 0,
                });
            }
        }

        let declarations = if request.tools_enabled {
            let search_available = match self.gate.available().await {
                Ok(available) => available,
                Err(e) => {
                    warn!(error = %e, "search budget unreadable, not offering search");
                    false
                }
            };
            Some(self.tools.declarations(search_available))
        } else {
            None
        };

        let mut conversation = Conversation::new(request.system_prompt.as_str());
        conversation.push(user_turn(request));
        let mut usage = TokenUsage::default();
        let mut tool_calls = 0;
        let max_calls = settings.max_tool_turns;

        for call in 1..=max_calls {
            advance(state, RunState::Generating);
            let generation = self
                .generate(
                    &model,
                    &conversation,
                    declarations.as_deref(),
                    &options,
                    settings.timeouts.model(),
                    cancel,
                )
                .await?;
            usage += generation.usage;

            if !generation.has_tool_calls() || declarations.is_none() {
                if let Some(key) = cache_key {
                    let response = CachedResponse::new(generation.text.as_str(), model.as_str());
                    self.cache.put(key, response).await;
                }
                return Ok(Answer {
                    text: generation.text,
                    model,
                    from_cache: false,
                    usage,
                    model_calls: call,
                    tool_calls,
                });
            }
            if call == max_calls {
                break;
            }

            advance(state, RunState::AwaitingToolResults);
            let mut responses = Vec::with_capacity(generation.tool_calls.len());
            for tool_call in &generation.tool_calls {
                let response = self
                    .execute_tool(tool_call, settings.timeouts.tool(), cancel)
                    .await?;
                responses.push(Part::FunctionResponse {
                    name: tool_call.name.clone(),
                    response,
                });
                tool_calls += 1;
            }
            conversation.push(model_turn(&generation));
            conversation.push(Turn::user(responses));
        }

        Err(RunError::OrchestrationLimitExceeded(max_calls))
    }

    /// One bounded model call, recorded against the tracker whatever its outcome
    #[instrument(
        skip(self, conversation, tools, options, cancel),
        fields(turns = conversation.turns.len())
    )]
    async fn generate(
        &self,
        model: &str,
        conversation: &Conversation,
        tools: Option<&[ToolDeclaration]>,
        options: &GenerationOptions,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Generation, RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let call = tokio::time::timeout(
            timeout,
            self.backend.generate(model, conversation, tools, options),
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = call => Some(result),
        };

        let usage = match &outcome {
            Some(Ok(Ok(generation))) => Usage::call(generation.usage.total_tokens),
            _ => Usage::failed_call(),
        };
        if let Err(e) = self.tracker.record(model, usage).await {
            warn!(model, error = %e, "failed to record model usage");
        }

        match outcome {
            None => Err(RunError::Cancelled),
            Some(Err(_)) => Err(Error::timeout("model call", timeout).into()),
            Some(Ok(result)) => result.map_err(RunError::from),
        }
    }

    /// Run one tool call. Failures become tool-result content; only cancellation is an error.
    #[instrument(skip(self, call, cancel), fields(tool = %call.name))]
    async fn execute_tool(
        &self,
        call: &ToolCall,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, RunError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            result = tokio::time::timeout(timeout, self.tools.execute(call)) => result,
        };
        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => ToolError::Timeout {
                tool: call.name.clone(),
                after_ms: timeout.as_millis() as u64,
            },
        };
        warn!(kind = error.kind(), error = %error, "tool call failed");
        Ok(error.to_response())
    }
}

impl<M, T, C> Compressor for Orchestrator<M, T, C>
where
    M: ModelBackend,
    T: ToolExecutor,
    C: CounterStore,
{
    type Error = RunError;

    async fn compress(&self, text: &str, max_chars: usize) -> Result<String, RunError> {
        let request = GenerationRequest::new(compression_prompt(max_chars), text).with_tools(false);
        Ok(self.run(&request).await?.text)
    }
}
