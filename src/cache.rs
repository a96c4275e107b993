//! # Response Cache
//!
//! Short-lived memoization of generations that did not use tools. Tool output
//! (search results in particular) goes stale, so tool-enabled runs never read
//! or write this cache.
//!
//! Entries live for [`CACHE_TTL`] from insertion; reads do not refresh them.
//! The table holds at most [`CACHE_MAX_ENTRIES`]; an insert into a full table
//! drops expired entries first and then the oldest ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// How long an entry stays servable
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Maximum number of entries held at once
pub const CACHE_MAX_ENTRIES: usize = 100;

/// A cached final answer
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub text: String,
    pub model: String,
    /// Set on copies handed out by [`ResponseCache::get`]
    pub from_cache: bool,
}

impl CachedResponse {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            from_cache: false,
        }
    }
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    inserted_at: Instant,
}

/// Bounded, TTL-limited response cache safe to share between tasks
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_limits(CACHE_TTL, CACHE_MAX_ENTRIES)
    }

    pub(crate) fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Digest identifying one generation request.
    ///
    /// Every field is length-prefixed before hashing so that moving text between
    /// fields always changes the key.
    pub fn key(
        model: &str,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> String {
        let mut hasher = Sha256::new();
        for field in [model, system_prompt, user_message] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(temperature.to_bits().to_be_bytes());
        hasher.update(max_output_tokens.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// A copy of the live entry for `key`, marked as served from cache
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        let mut response = entry.response.clone();
        response.from_cache = true;
        Some(response)
    }

    /// Insert or overwrite the entry for `key`
    pub async fn put(&self, key: impl Into<String>, response: CachedResponse) {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
            debug!(size = entries.len(), "evicted cache entries");
        }
        entries.insert(
            key,
            Entry {
                response: CachedResponse {
                    from_cache: false,
                    ..response
                },
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
