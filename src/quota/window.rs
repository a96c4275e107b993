//! Fixed counting windows and the counter keys derived from them.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::config::{ModelCapacity, WindowSettings};

/// A rate metric tracked per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Requests per minute
    Rpm,
    /// Tokens per minute
    Tpm,
    /// Requests per day
    Rpd,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Rpm, Metric::Tpm, Metric::Rpd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Rpm => "rpm",
            Metric::Tpm => "tpm",
            Metric::Rpd => "rpd",
        }
    }

    /// Hard limit for this metric
    pub fn limit(&self, capacity: &ModelCapacity) -> u64 {
        match self {
            Metric::Rpm => capacity.rpm,
            Metric::Tpm => capacity.tpm,
            Metric::Rpd => capacity.rpd,
        }
    }

    /// Window length for this metric, in milliseconds
    pub fn window_ms(&self, windows: &WindowSettings) -> u64 {
        match self {
            Metric::Rpm | Metric::Tpm => windows.minute_ms,
            Metric::Rpd => windows.day_ms,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One fixed bucket of wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive start, Unix milliseconds
    pub start_ms: i64,
    /// Length in milliseconds
    pub len_ms: u64,
}

impl Window {
    /// The window of length `len_ms` containing `now_ms`
    pub fn containing(now_ms: i64, len_ms: u64) -> Self {
        let len = len_ms.max(1) as i64;
        Self {
            start_ms: now_ms - now_ms.rem_euclid(len),
            len_ms: len as u64,
        }
    }

    /// Start of the next window, when counters for this one stop mattering
    pub fn reset_at_ms(&self) -> i64 {
        self.start_ms + self.len_ms as i64
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.len_ms)
    }

    /// Store key for `metric` of `model` in this window
    pub fn counter_key(&self, model: &str, metric: Metric) -> String {
        format!("rate:{}:{}:{}", model, metric, self.start_ms)
    }
}

pub(crate) fn last_request_key(model: &str) -> String {
    format!("rate:{}:last_request", model)
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
