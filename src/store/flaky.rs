//! Counter store with injected faults, for tests.

use std::time::Duration;

use super::{CounterStore, MemoryStore};
use crate::error::{Error, Result};

/// Wraps a `MemoryStore` and fails or stalls selected calls
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_set: bool,
    failing_increments: Option<&'static str>,
    slow_increments: Option<(&'static str, Duration)>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `set` returns an error
    pub fn failing_set(mut self) -> Self {
        self.fail_set = true;
        self
    }

    /// Increments of keys containing `pattern` return an error
    pub fn failing_increments(mut self, pattern: &'static str) -> Self {
        self.failing_increments = Some(pattern);
        self
    }

    /// Increments of keys containing `pattern` sleep for `delay` first
    pub fn slow_increments(mut self, pattern: &'static str, delay: Duration) -> Self {
        self.slow_increments = Some((pattern, delay));
        self
    }
}

impl CounterStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<i64> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        if self.fail_set {
            return Err(Error::Store(format!("set of {key} rejected")));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64> {
        if let Some((pattern, delay)) = self.slow_increments {
            if key.contains(pattern) {
                tokio::time::sleep(delay).await;
            }
        }
        if self.failing_increments.is_some_and(|p| key.contains(p)) {
            return Err(Error::Store(format!("increment of {key} rejected")));
        }
        self.inner.increment(key, delta, ttl).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}
