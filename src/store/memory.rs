//! In-process counter store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CounterStore;
use crate::error::Result;

/// Minimum time between sweeps of expired keys
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    last_sweep: Option<Instant>,
}

impl Table {
    /// Drop expired keys, at most once per `SWEEP_INTERVAL`.
    ///
    /// Window keys are never touched again once their window passes, so without
    /// this the map would grow by a few keys per model every minute.
    fn sweep(&mut self, now: Instant) {
        if self
            .last_sweep
            .is_some_and(|last| now.duration_since(last) < SWEEP_INTERVAL)
        {
            return;
        }
        self.entries.retain(|_, e| e.is_live(now));
        self.last_sweep = Some(now);
    }
}

/// Counter store held in process memory
///
/// Clones share the same map. Writes sweep out expired keys periodically.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.table
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let table = self.table.lock().await;
        Ok(table
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map_or(0, |e| e.value))
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut table = self.table.lock().await;
        table.sweep(now);
        table.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut table = self.table.lock().await;
        table.sweep(now);
        let entry = table.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: now + ttl,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: 0,
                expires_at: now + ttl,
            };
        }
        entry.value += delta;
        Ok(entry.value)
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .table
            .lock()
            .await
            .entries
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.table.lock().await.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn missing_key_reads_as_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), 0);
        assert!(!store.has("nope").await.unwrap());
    }

    #[tokio::test]
    async fn increment_accumulates_and_returns_new_value() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("k", 3, TTL).await.unwrap(), 3);
        assert_eq!(store.increment("k", 4, TTL).await.unwrap(), 7);
        assert_eq!(store.get("k").await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_not_extended_by_increments() {
        let store = MemoryStore::new();
        store.increment("k", 1, TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        store.increment("k", 1, TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.get("k").await.unwrap(), 0);
        assert_eq!(store.increment("k", 5, TTL).await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn set_restarts_expiry() {
        let store = MemoryStore::new();
        store.set("k", 9, Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        store.set("k", 2, Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(store.has("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = MemoryStore::new();
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("k", 1, TTL).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get("k").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryStore::new();
        store.set("k", 1, TTL).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn passed_windows_are_swept() {
        let store = MemoryStore::new();
        for minute in 0..500 {
            store
                .increment(&format!("rate:m:rpm:{}", minute * 60_000), 1, TTL)
                .await
                .unwrap();
            tokio::time::advance(TTL).await;
        }

        assert!(store.is_empty().await);
        assert!(store.table.lock().await.entries.len() <= 2);
    }
}
