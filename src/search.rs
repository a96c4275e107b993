//! # Web Search Module
//!
//! Backends for the `web_search` tool. A backend only performs the search; the
//! monthly budget is enforced by [`crate::quota::SearchQuotaGate`] before a
//! backend is ever called.
//!
//! ## Key Components
//!
//! - `SearchBackend`: One search call
//! - `BraveSearch`: Brave Search web API, paced client-side
//! - `SearchResponse`, `SearchHit`: Results handed back to the model

mod brave;
#[cfg(test)]
pub(crate) mod mock_search;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use brave::BraveSearch;

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Results of one search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_results: u64,
}

/// A web search provider
pub trait SearchBackend: Send + Sync {
    /// Search for `query`, asking for at most `count` results localized to `region`
    fn search(
        &self,
        query: &str,
        region: &str,
        count: u32,
    ) -> impl Future<Output = Result<SearchResponse>> + Send;
}
