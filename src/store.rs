//! # Counter Store Module
//!
//! Durable integer counters with per-key expiry. The rate tracker and the search
//! gate keep all of their state here, keyed by window, so the in-process
//! components stay stateless and several processes can share one store.
//!
//! ## Key Components
//!
//! - `CounterStore`: The async key/value contract the quota components consume
//! - `MemoryStore`: Single-process implementation
//! - `LibsqlStore`: Persistent implementation on libSQL
//!
//! `increment` must be atomic at the storage layer. Callers never read, add and
//! write back.

#[cfg(test)]
pub(crate) mod flaky;
mod libsql_store;
mod memory;

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

pub use libsql_store::LibsqlStore;
pub use memory::MemoryStore;

/// Async counter storage with per-key time-to-live
///
/// A key that has expired behaves exactly like a key that was never written.
pub trait CounterStore: Send + Sync + 'static {
    /// Current value, or 0 when the key is absent or expired
    fn get(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Overwrite the value and restart its expiry
    fn set(&self, key: &str, value: i64, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Atomically add `delta` and return the new value.
    ///
    /// `ttl` applies when the key is created (or recreated after expiry); later
    /// increments do not extend it.
    fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Whether a live value exists for the key
    fn has(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Remove the key
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}
