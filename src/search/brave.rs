//! Brave Search web API.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use tracing::{Instrument, debug, debug_span, error, instrument};

use super::{SearchBackend, SearchHit, SearchResponse};
use crate::error::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";

/// Brave caps `count` at 20
const MAX_COUNT: u32 = 20;

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// Brave web search with client-side pacing
///
/// The free plan allows one request per second; calls wait on a shared
/// limiter rather than collecting 429s. Clones share the limiter.
#[derive(Clone)]
pub struct BraveSearch {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for BraveSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BraveSearch")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl BraveSearch {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_quota(api_key, Quota::per_second(NonZeroU32::MIN))
    }

    /// Create a client paced by a custom quota
    pub fn with_quota(api_key: impl Into<String>, quota: Quota) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Auth("Brave API key is empty".to_string()));
        }
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }
}

impl SearchBackend for BraveSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, region: &str, count: u32) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(Error::InvalidRequest("search query is empty".to_string()));
        }
        self.limiter
            .until_ready()
            .instrument(debug_span!("limiter"))
            .await;

        let url = format!("{}/res/v1/web/search", self.base_url);
        let count = count.clamp(1, MAX_COUNT).to_string();
        debug!("Searching Brave for {:?}", query);
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str()), ("country", region)])
            .send()
            .await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("API error: {} - {}", status, response_text);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => Error::RateLimit {
                    retry_after_secs: 1,
                },
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::Auth("Invalid Brave subscription token".to_string())
                }
                _ => Error::Api {
                    status_code: status.as_u16(),
                    message: response_text,
                },
            });
        }

        let parsed: BraveResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse response: {}", e);
            Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
        })?;
        let results: Vec<SearchHit> = parsed
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                description: r.description,
            })
            .collect();
        Ok(SearchResponse {
            total_results: results.len() as u64,
            results,
        })
    }
}
