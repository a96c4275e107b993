//! Persistent counter store on libSQL.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use libsql::{Connection, params};
use tracing::{debug, instrument, warn};

use super::CounterStore;
use crate::error::{Error, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS counters (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// Minimum time between purges triggered by increments, in milliseconds
const PURGE_INTERVAL_MS: i64 = 60_000;

/// Counter store backed by a libSQL table
///
/// Expiry is stored as an absolute Unix timestamp in milliseconds. Rows past
/// their expiry are invisible to reads and are reset by the next increment.
/// Increments purge expired rows at most once a minute, so passed windows do
/// not pile up in a long-running process.
#[derive(Clone)]
pub struct LibsqlStore {
    conn: Connection,
    last_purge_ms: Arc<AtomicI64>,
    purge_interval_ms: i64,
}

impl std::fmt::Debug for LibsqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlStore").finish_non_exhaustive()
    }
}

impl LibsqlStore {
    /// Wrap an open connection, creating the table if needed
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, ()).await?;
        Ok(Self {
            conn,
            last_purge_ms: Arc::new(AtomicI64::new(0)),
            purge_interval_ms: PURGE_INTERVAL_MS,
        })
    }

    /// Open (or create) a local database file. `:memory:` gives a private in-memory database.
    pub async fn open(path: &str) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| Error::Store(format!("Failed to open database: {}", e)))?;
        let conn = db
            .connect()
            .map_err(|e| Error::Store(format!("Failed to connect to database: {}", e)))?;
        let store = Self::new(conn).await?;
        store.purge_expired().await?;
        Ok(store)
    }

    /// Delete every expired row and return how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = now_ms();
        self.last_purge_ms.store(now, Ordering::Relaxed);
        let removed = self
            .conn
            .execute("DELETE FROM counters WHERE expires_at <= ?1", params![now])
            .await?;
        if removed > 0 {
            debug!(removed, "purged expired counters");
        }
        Ok(removed)
    }

    /// Purge unless another caller did so within the purge interval
    async fn purge_if_due(&self, now: i64) {
        let last = self.last_purge_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.purge_interval_ms {
            return;
        }
        if self
            .last_purge_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        if let Err(e) = self.purge_expired().await {
            warn!(error = %e, "failed to purge expired counters");
        }
    }
}

#[cfg(test)]
impl LibsqlStore {
    fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval_ms = ttl_ms(interval);
        self
    }

    async fn row_count(&self) -> i64 {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM counters", ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

impl CounterStore for LibsqlStore {
    async fn get(&self, key: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM counters WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let expires_at = now_ms().saturating_add(ttl_ms(ttl));
        self.conn
            .execute(
                "INSERT INTO counters (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64> {
        let now = now_ms();
        self.purge_if_due(now).await;
        let expires_at = now.saturating_add(ttl_ms(ttl));
        // Single statement so concurrent writers never interleave a read and a write.
        let mut rows = self
            .conn
            .query(
                "INSERT INTO counters (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                 value = CASE WHEN counters.expires_at <= ?4
                     THEN excluded.value ELSE counters.value + excluded.value END,
                 expires_at = CASE WHEN counters.expires_at <= ?4
                     THEN excluded.expires_at ELSE counters.expires_at END
                 RETURNING value",
                params![key, delta, expires_at, now],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Err(Error::Store(format!("increment of {key} returned no row"))),
        }
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM counters WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms()],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM counters WHERE key = ?1", params![key])
            .await?;
        Ok(())
    }
}
