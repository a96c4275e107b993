//! Settings structures and their builder.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Rate limits for one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapacity {
    /// Requests per minute
    pub rpm: u64,

    /// Tokens per minute
    pub tpm: u64,

    /// Requests per day
    pub rpd: u64,

    /// Selection order, lower first
    pub priority: u32,
}

/// Window lengths for the rate counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Length of the rpm/tpm window in milliseconds
    pub minute_ms: u64,

    /// Length of the rpd window in milliseconds
    pub day_ms: u64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            minute_ms: 60_000,
            day_ms: 86_400_000,
        }
    }
}

/// Web search budget and request shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Free searches per calendar month
    pub free_quota: u64,

    /// Country code passed to the search backend
    pub region: String,

    /// Results requested per search
    pub result_count: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            free_quota: 2000,
            region: "us".to_string(),
            result_count: 5,
        }
    }
}

/// Defaults applied to generation requests that do not set their own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

/// Upper bounds for every external call, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub model_ms: u64,
    pub search_ms: u64,
    pub store_ms: u64,
    pub tool_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            model_ms: 60_000,
            search_ms: 10_000,
            store_ms: 2_000,
            tool_ms: 15_000,
        }
    }
}

impl TimeoutSettings {
    pub fn model(&self) -> Duration {
        Duration::from_millis(self.model_ms)
    }

    pub fn search(&self) -> Duration {
        Duration::from_millis(self.search_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_millis(self.tool_ms)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Limits per model name
    pub models: BTreeMap<String, ModelCapacity>,

    /// Fraction of each hard limit that may be used, in (0, 1]
    pub safety_buffer: f64,

    /// Window lengths for the rate counters
    pub windows: WindowSettings,

    /// Search budget
    pub search: SearchSettings,

    /// Hard length limit of one outbound platform message, in characters
    pub message_limit: usize,

    /// Maximum model calls in one tool-calling run
    pub max_tool_turns: usize,

    /// Generation defaults
    pub generation: GenerationDefaults,

    /// Timeouts for external calls
    pub timeouts: TimeoutSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "gemini-2.5-flash".to_string(),
            ModelCapacity {
                rpm: 10,
                tpm: 250_000,
                rpd: 250,
                priority: 1,
            },
        );
        models.insert(
            "gemini-2.5-flash-lite".to_string(),
            ModelCapacity {
                rpm: 15,
                tpm: 250_000,
                rpd: 1000,
                priority: 2,
            },
        );
        Self {
            models,
            safety_buffer: 0.9,
            windows: WindowSettings::default(),
            search: SearchSettings::default(),
            message_limit: 2000,
            max_tool_turns: 5,
            generation: GenerationDefaults::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Settings {
    /// Create a new builder
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Read settings from a JSON file. Missing fields take their defaults.
    pub async fn read_config(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Model names ordered by priority, ties broken by name.
    pub fn priority_list(&self) -> Vec<String> {
        let mut models: Vec<(&String, &ModelCapacity)> = self.models.iter().collect();
        models.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        models.into_iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn capacity(&self, model: &str) -> Option<&ModelCapacity> {
        self.models.get(model)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.safety_buffer > 0.0 && self.safety_buffer <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "safety_buffer must be in (0, 1], got {}",
                self.safety_buffer
            )));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Validation(
                "at least one model must be configured".to_string(),
            ));
        }
        if self.windows.minute_ms == 0 || self.windows.day_ms == 0 {
            return Err(ConfigError::Validation(
                "window lengths must be greater than zero".to_string(),
            ));
        }
        if self.message_limit == 0 {
            return Err(ConfigError::Validation(
                "message_limit must be greater than zero".to_string(),
            ));
        }
        if self.max_tool_turns == 0 {
            return Err(ConfigError::Validation(
                "max_tool_turns must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Settings
#[derive(Debug)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    /// Start from the default settings
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    /// Drop every configured model, including the defaults
    pub fn clear_models(mut self) -> Self {
        self.settings.models.clear();
        self
    }

    /// Add or replace a model's limits
    pub fn model(mut self, name: impl Into<String>, capacity: ModelCapacity) -> Self {
        self.settings.models.insert(name.into(), capacity);
        self
    }

    pub fn safety_buffer(mut self, safety_buffer: f64) -> Self {
        self.settings.safety_buffer = safety_buffer;
        self
    }

    pub fn windows(mut self, minute_ms: u64, day_ms: u64) -> Self {
        self.settings.windows = WindowSettings { minute_ms, day_ms };
        self
    }

    pub fn search_free_quota(mut self, free_quota: u64) -> Self {
        self.settings.search.free_quota = free_quota;
        self
    }

    pub fn message_limit(mut self, message_limit: usize) -> Self {
        self.settings.message_limit = message_limit;
        self
    }

    pub fn max_tool_turns(mut self, max_tool_turns: usize) -> Self {
        self.settings.max_tool_turns = max_tool_turns;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.settings.timeouts = timeouts;
        self
    }

    /// Build the settings. Validation happens when they are installed in a handle.
    pub fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(priority: u32) -> ModelCapacity {
        ModelCapacity {
            rpm: 10,
            tpm: 1000,
            rpd: 100,
            priority,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.message_limit, 2000);
        assert_eq!(settings.search.free_quota, 2000);
    }

    #[test]
    fn priority_list_orders_by_priority_then_name() {
        let settings = Settings::builder()
            .clear_models()
            .model("zeta", capacity(1))
            .model("beta", capacity(2))
            .model("alpha", capacity(1))
            .build();
        assert_eq!(settings.priority_list(), vec!["alpha", "zeta", "beta"]);
    }

    #[test]
    fn safety_buffer_outside_range_is_rejected() {
        for buffer in [0.0, -0.5, 1.01] {
            let settings = Settings::builder().safety_buffer(buffer).build();
            assert!(matches!(
                settings.validate(),
                Err(ConfigError::Validation(ref msg)) if msg.contains("safety_buffer")
            ));
        }
        assert!(Settings::builder().safety_buffer(1.0).build().validate().is_ok());
    }

    #[test]
    fn empty_model_table_is_rejected() {
        let settings = Settings::builder().clear_models().build();
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        tokio::fs::write(
            &path,
            r#"{
                "models": {"gemini-pro": {"rpm": 5, "tpm": 100, "rpd": 50, "priority": 1}},
                "safety_buffer": 0.8,
                "search": {"free_quota": 10}
            }"#,
        )
        .await
        .unwrap();

        let settings = Settings::read_config(&path).await.unwrap();
        assert_eq!(settings.models.len(), 1);
        assert_eq!(settings.safety_buffer, 0.8);
        assert_eq!(settings.search.free_quota, 10);
        assert_eq!(settings.search.region, "us");
        assert_eq!(settings.windows, WindowSettings::default());
    }

    #[tokio::test]
    async fn unreadable_file_reports_path() {
        let err = Settings::read_config("/definitely/not/here.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
