//! Scripted search backend for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{SearchBackend, SearchHit, SearchResponse};
use crate::error::{Error, Result};

/// Returns queued results in order, then a single canned hit
#[derive(Debug, Clone, Default)]
pub struct MockSearch {
    script: Arc<Mutex<VecDeque<Result<SearchResponse>>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_error(&self, error: Error) {
        self.script.lock().await.push_back(Err(error));
    }

    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

impl SearchBackend for MockSearch {
    async fn search(&self, query: &str, _region: &str, _count: u32) -> Result<SearchResponse> {
        self.queries.lock().await.push(query.to_string());
        let next = self.script.lock().await.pop_front();
        next.unwrap_or_else(|| {
            Ok(SearchResponse {
                results: vec![SearchHit {
                    title: format!("About {query}"),
                    url: "https://example.com".to_string(),
                    description: "A result".to_string(),
                }],
                total_results: 1,
            })
        })
    }
}
