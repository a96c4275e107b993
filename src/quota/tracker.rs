//! Per-model usage accounting over the counter store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::window::{Metric, Window, last_request_key, now_ms};
use crate::config::ConfigHandle;
use crate::error::{Error, Result};
use crate::store::CounterStore;

/// Usage to add after a model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub requests: u64,
    pub tokens: u64,
}

impl Usage {
    /// One request that consumed `tokens`
    pub fn call(tokens: u64) -> Self {
        Self {
            requests: 1,
            tokens,
        }
    }

    /// One request whose token count is unknown, e.g. a failed call
    pub fn failed_call() -> Self {
        Self::call(0)
    }

    fn delta(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Rpm | Metric::Rpd => self.requests,
            Metric::Tpm => self.tokens,
        }
    }
}

/// Usage of one metric in its current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricUsage {
    pub metric: Metric,
    pub used: u64,
    pub limit: u64,
    /// `limit * safety_buffer`
    pub effective_limit: f64,
    /// Units still admissible before the effective limit is reached
    pub remaining: u64,
    /// `used / effective_limit`; infinite when the effective limit is zero
    pub percentage: f64,
    /// Start of the next window, Unix milliseconds
    pub reset_at_ms: i64,
}

impl MetricUsage {
    fn new(metric: Metric, used: u64, limit: u64, safety_buffer: f64, window: Window) -> Self {
        let effective_limit = limit as f64 * safety_buffer;
        let percentage = if effective_limit > 0.0 {
            used as f64 / effective_limit
        } else {
            f64::INFINITY
        };
        Self {
            metric,
            used,
            limit,
            effective_limit,
            remaining: (effective_limit.ceil() as u64).saturating_sub(used),
            percentage,
            reset_at_ms: window.reset_at_ms(),
        }
    }
}

/// Point-in-time capacity of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySnapshot {
    pub model: String,
    pub rpm: MetricUsage,
    pub tpm: MetricUsage,
    pub rpd: MetricUsage,
    /// Highest metric percentage
    pub overall_percentage: f64,
    pub can_make_request: bool,
    /// When the model was last called, if known
    pub last_request_ms: Option<i64>,
}

impl CapacitySnapshot {
    pub fn metric(&self, metric: Metric) -> &MetricUsage {
        match metric {
            Metric::Rpm => &self.rpm,
            Metric::Tpm => &self.tpm,
            Metric::Rpd => &self.rpd,
        }
    }

    /// The metric closest to its limit
    pub fn bottleneck(&self) -> Metric {
        Metric::ALL
            .into_iter()
            .max_by(|a, b| {
                self.metric(*a)
                    .percentage
                    .total_cmp(&self.metric(*b).percentage)
            })
            .unwrap_or(Metric::Rpm)
    }
}

/// Computes and records per-model usage against configured limits
///
/// Stateless apart from its handles: limits and the safety buffer are read from
/// the live configuration on every call.
pub struct RateLimitTracker<C> {
    store: Arc<C>,
    config: ConfigHandle,
}

impl<C> Clone for RateLimitTracker<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<C: CounterStore> RateLimitTracker<C> {
    pub fn new(store: Arc<C>, config: ConfigHandle) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Current capacity of `model`
    pub async fn capacity(&self, model: &str) -> Result<CapacitySnapshot> {
        self.capacity_at(model, now_ms()).await
    }

    /// Capacity of `model` as seen at `now_ms`
    #[instrument(skip(self))]
    pub async fn capacity_at(&self, model: &str, now_ms: i64) -> Result<CapacitySnapshot> {
        let settings = self.config.current();
        let capacity = settings
            .capacity(model)
            .copied()
            .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
        let timeout = settings.timeouts.store();

        let window =
            |metric: Metric| Window::containing(now_ms, metric.window_ms(&settings.windows));
        let (rpm, tpm, rpd) = futures::try_join!(
            self.read(model, Metric::Rpm, window(Metric::Rpm), timeout),
            self.read(model, Metric::Tpm, window(Metric::Tpm), timeout),
            self.read(model, Metric::Rpd, window(Metric::Rpd), timeout),
        )?;

        let usage = |metric: Metric, used: u64| {
            MetricUsage::new(
                metric,
                used,
                metric.limit(&capacity),
                settings.safety_buffer,
                window(metric),
            )
        };
        let rpm = usage(Metric::Rpm, rpm);
        let tpm = usage(Metric::Tpm, tpm);
        let rpd = usage(Metric::Rpd, rpd);
        let overall_percentage = rpm.percentage.max(tpm.percentage).max(rpd.percentage);

        let last_request = bounded(timeout, self.store.get(&last_request_key(model))).await;
        let last_request_ms = match last_request {
            Ok(0) => None,
            Ok(ms) => Some(ms),
            Err(e) => {
                debug!(model, error = %e, "last request time unavailable");
                None
            }
        };

        Ok(CapacitySnapshot {
            model: model.to_string(),
            rpm,
            tpm,
            rpd,
            overall_percentage,
            can_make_request: overall_percentage < 1.0,
            last_request_ms,
        })
    }

    /// Whether a request to `model` is admissible right now
    pub async fn admissible(&self, model: &str) -> Result<bool> {
        Ok(self.capacity(model).await?.can_make_request)
    }

    /// Add `usage` to the current windows of `model`
    pub async fn record(&self, model: &str, usage: Usage) -> Result<()> {
        self.record_at(model, usage, now_ms()).await
    }

    #[instrument(skip(self))]
    pub async fn record_at(&self, model: &str, usage: Usage, now_ms: i64) -> Result<()> {
        let settings = self.config.current();
        if settings.capacity(model).is_none() {
            return Err(Error::UnknownModel(model.to_string()));
        }
        let timeout = settings.timeouts.store();

        // Every window is attempted so one failing counter does not skew the others.
        let mut first_error = None;
        for metric in Metric::ALL {
            let delta = usage.delta(metric);
            if delta == 0 {
                continue;
            }
            let window = Window::containing(now_ms, metric.window_ms(&settings.windows));
            let key = window.counter_key(model, metric);
            let delta = i64::try_from(delta).unwrap_or(i64::MAX);
            if let Err(e) = bounded(timeout, self.store.increment(&key, delta, window.ttl())).await
            {
                warn!(model, %metric, error = %e, "failed to increment usage counter");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            monotonic_counter.parley_model_requests = usage.requests,
            monotonic_counter.parley_model_tokens = usage.tokens,
            model,
            "recorded model usage"
        );

        let day = Duration::from_millis(settings.windows.day_ms);
        if let Err(e) = bounded(
            timeout,
            self.store.set(&last_request_key(model), now_ms, day),
        )
        .await
        {
            warn!(model, error = %e, "failed to record last request time");
        }
        Ok(())
    }

    async fn read(
        &self,
        model: &str,
        metric: Metric,
        window: Window,
        timeout: Duration,
    ) -> Result<u64> {
        let value = bounded(timeout, self.store.get(&window.counter_key(model, metric))).await?;
        Ok(value.max(0) as u64)
    }
}

/// Bound a store call by `timeout`
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::timeout("counter store call", timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelCapacity, Settings};
    use crate::store::MemoryStore;
    use crate::store::flaky::FlakyStore;

    fn settings() -> Settings {
        Settings::builder()
            .clear_models()
            .model(
                "m",
                ModelCapacity {
                    rpm: 10,
                    tpm: 1000,
                    rpd: 100,
                    priority: 1,
                },
            )
            .build()
    }

    fn tracker(rpm: u64, tpm: u64, rpd: u64, buffer: f64) -> RateLimitTracker<MemoryStore> {
        let settings = Settings::builder()
            .clear_models()
            .model(
                "m",
                ModelCapacity {
                    rpm,
                    tpm,
                    rpd,
                    priority: 1,
                },
            )
            .safety_buffer(buffer)
            .build();
        let config = ConfigHandle::new(settings).unwrap();
        RateLimitTracker::new(Arc::new(MemoryStore::new()), config)
    }

    #[tokio::test]
    async fn fresh_model_is_admissible() {
        let tracker = tracker(10, 1000, 100, 0.9);
        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.overall_percentage, 0.0);
        assert!(snapshot.can_make_request);
        assert_eq!(snapshot.rpm.remaining, 9);
        assert_eq!(snapshot.last_request_ms, None);
    }

    #[tokio::test]
    async fn usage_at_buffered_limit_is_not_admissible() {
        let tracker = tracker(10, 1_000_000, 1000, 0.9);
        for _ in 0..8 {
            tracker.record("m", Usage::call(10)).await.unwrap();
        }
        assert!(tracker.admissible("m").await.unwrap());

        tracker.record("m", Usage::call(10)).await.unwrap();
        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.rpm.used, 9);
        assert_eq!(snapshot.rpm.remaining, 0);
        assert!(!snapshot.can_make_request);
        assert_eq!(snapshot.bottleneck(), Metric::Rpm);
    }

    #[tokio::test]
    async fn raising_the_buffer_never_reduces_admissibility() {
        let store = Arc::new(MemoryStore::new());
        let mut last = false;
        for buffer in [0.5, 0.7, 0.9, 1.0] {
            let settings = Settings::builder()
                .clear_models()
                .model(
                    "m",
                    ModelCapacity {
                        rpm: 10,
                        tpm: 1000,
                        rpd: 100,
                        priority: 1,
                    },
                )
                .safety_buffer(buffer)
                .build();
            let config = ConfigHandle::new(settings).unwrap();
            let tracker = RateLimitTracker::new(store.clone(), config);
            if buffer == 0.5 {
                for _ in 0..6 {
                    tracker.record("m", Usage::call(1)).await.unwrap();
                }
            }
            let admissible = tracker.admissible("m").await.unwrap();
            assert!(admissible || !last, "buffer {buffer} lost admissibility");
            last = admissible;
        }
        assert!(last);
    }

    #[tokio::test]
    async fn tokens_drive_the_tpm_metric() {
        let tracker = tracker(100, 1000, 1000, 1.0);
        tracker.record("m", Usage::call(1000)).await.unwrap();
        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.tpm.used, 1000);
        assert_eq!(snapshot.bottleneck(), Metric::Tpm);
        assert!(!snapshot.can_make_request);
    }

    #[tokio::test]
    async fn concurrent_records_are_counted_once_each() {
        let tracker = tracker(1000, 1_000_000, 10_000, 1.0);
        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.record("m", Usage::call(2)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.rpm.used, 25);
        assert_eq!(snapshot.rpd.used, 25);
        assert_eq!(snapshot.tpm.used, 50);
        assert!(snapshot.last_request_ms.is_some());
    }

    #[tokio::test]
    async fn counters_are_per_window() {
        let tracker = tracker(10, 1000, 100, 1.0);
        tracker.record_at("m", Usage::call(5), 30_000).await.unwrap();

        let same = tracker.capacity_at("m", 59_999).await.unwrap();
        let next = tracker.capacity_at("m", 60_000).await.unwrap();
        assert_eq!(same.rpm.used, 1);
        assert_eq!(same.rpm.reset_at_ms, 60_000);
        assert_eq!(next.rpm.used, 0);
        assert_eq!(next.rpd.used, 1);
    }

    #[tokio::test]
    async fn zero_limit_is_never_admissible() {
        let tracker = tracker(0, 1000, 100, 1.0);
        let snapshot = tracker.capacity("m").await.unwrap();
        assert!(snapshot.overall_percentage.is_infinite());
        assert!(!snapshot.can_make_request);
    }

    #[tokio::test]
    async fn unknown_model_is_an_error() {
        let tracker = tracker(10, 1000, 100, 0.9);
        assert!(matches!(
            tracker.capacity("other").await,
            Err(Error::UnknownModel(name)) if name == "other"
        ));
        assert!(matches!(
            tracker.record("other", Usage::call(1)).await,
            Err(Error::UnknownModel(_))
        ));
    }

    #[tokio::test]
    async fn reloaded_limits_apply_immediately() {
        let tracker = tracker(10, 1000, 100, 1.0);
        for _ in 0..5 {
            tracker.record("m", Usage::call(1)).await.unwrap();
        }
        assert!(tracker.admissible("m").await.unwrap());

        let tighter = Settings::builder()
            .clear_models()
            .model(
                "m",
                ModelCapacity {
                    rpm: 5,
                    tpm: 1000,
                    rpd: 100,
                    priority: 1,
                },
            )
            .build();
        tracker.config().reload(tighter).unwrap();
        assert!(!tracker.admissible("m").await.unwrap());
    }

    #[tokio::test]
    async fn last_request_failure_does_not_fail_record() {
        let store = Arc::new(FlakyStore::new().failing_set());
        let tracker = RateLimitTracker::new(store, ConfigHandle::new(settings()).unwrap());

        tracker.record("m", Usage::call(40)).await.unwrap();

        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.rpm.used, 1);
        assert_eq!(snapshot.tpm.used, 40);
        assert_eq!(snapshot.rpd.used, 1);
        assert_eq!(snapshot.last_request_ms, None);
    }

    #[tokio::test]
    async fn one_failing_counter_does_not_skip_the_others() {
        let store = Arc::new(FlakyStore::new().failing_increments(":tpm:"));
        let tracker = RateLimitTracker::new(store, ConfigHandle::new(settings()).unwrap());

        let err = tracker.record("m", Usage::call(40)).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let snapshot = tracker.capacity("m").await.unwrap();
        assert_eq!(snapshot.rpm.used, 1);
        assert_eq!(snapshot.tpm.used, 0);
        assert_eq!(snapshot.rpd.used, 1);
    }
}
