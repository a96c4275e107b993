//! The `web_search` tool.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::ToolError;
use crate::config::ConfigHandle;
use crate::quota::SearchQuotaGate;
use crate::search::SearchBackend;
use crate::store::CounterStore;

/// Arguments of `web_search`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// What to search the web for
    pub query: String,
}

/// Check the monthly budget, search, then count the search exactly once.
///
/// The count runs on its own task and completes even if this future is dropped.
pub(super) async fn run<S, C>(
    backend: &S,
    gate: &SearchQuotaGate<C>,
    config: &ConfigHandle,
    args: WebSearchArgs,
) -> Result<Value, ToolError>
where
    S: SearchBackend,
    C: CounterStore,
{
    let budget = gate.budget().await?;
    if !budget.available {
        debug!(used = budget.used, "search skipped, monthly quota exhausted");
        return Err(ToolError::QuotaExceeded {
            used: budget.used,
            free_quota: budget.free_quota,
        });
    }

    let settings = config.current();
    let timeout = settings.timeouts.search();
    let response = tokio::time::timeout(
        timeout,
        backend.search(&args.query, &settings.search.region, settings.search.result_count),
    )
    .await
    .map_err(|_| ToolError::Timeout {
        tool: super::WEB_SEARCH.to_string(),
        after_ms: timeout.as_millis() as u64,
    })??;

    // Detached so a timeout or cancellation of this call cannot drop the count.
    let gate = gate.clone();
    match tokio::spawn(async move { gate.consume().await }).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "search succeeded but could not be counted"),
        Err(e) => warn!(error = %e, "search counting task failed"),
    }

    Ok(json!({
        "query": args.query,
        "results": response.results,
        "totalResults": response.total_results,
    }))
}
