//! Monthly budget for the web search tool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::tracker::bounded;
use crate::config::ConfigHandle;
use crate::error::Result;
use crate::store::CounterStore;

/// Long enough for a month key to outlive its month
const MONTH_TTL: Duration = Duration::from_secs(32 * 24 * 60 * 60);

/// Search usage for the current month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchBudget {
    /// Month this budget covers, `YYYY-MM`
    pub month: String,
    pub used: u64,
    pub free_quota: u64,
    pub remaining: u64,
    pub available: bool,
}

impl SearchBudget {
    fn new(month: String, used: u64, free_quota: u64) -> Self {
        let remaining = free_quota.saturating_sub(used);
        Self {
            month,
            used,
            free_quota,
            remaining,
            available: remaining > 0,
        }
    }
}

/// Monthly search budget, independent of the per-model limits
pub struct SearchQuotaGate<C> {
    store: Arc<C>,
    config: ConfigHandle,
}

impl<C> Clone for SearchQuotaGate<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

pub(crate) fn month_key(now: DateTime<Utc>) -> String {
    format!("search:{}", now.format("%Y-%m"))
}

impl<C: CounterStore> SearchQuotaGate<C> {
    pub fn new(store: Arc<C>, config: ConfigHandle) -> Self {
        Self { store, config }
    }

    /// Usage of the current month
    pub async fn budget(&self) -> Result<SearchBudget> {
        self.budget_at(Utc::now()).await
    }

    pub async fn budget_at(&self, now: DateTime<Utc>) -> Result<SearchBudget> {
        let settings = self.config.current();
        let key = month_key(now);
        let used = bounded(settings.timeouts.store(), self.store.get(&key)).await?;
        Ok(SearchBudget::new(
            now.format("%Y-%m").to_string(),
            used.max(0) as u64,
            settings.search.free_quota,
        ))
    }

    /// Whether a search may run this month
    pub async fn available(&self) -> Result<bool> {
        Ok(self.budget().await?.available)
    }

    /// Count one completed search against this month
    #[instrument(skip(self))]
    pub async fn consume(&self) -> Result<()> {
        let timeout = self.config.current().timeouts.store();
        let used = bounded(
            timeout,
            self.store.increment(&month_key(Utc::now()), 1, MONTH_TTL),
        )
        .await?;
        info!(monotonic_counter.parley_searches = 1u64, used, "search consumed");
        Ok(())
    }
}
