//! # Configuration Module
//!
//! Live configuration for the engine: per-model capacities, the safety buffer,
//! window lengths, the search budget and the platform message limit.
//!
//! ## Key Components
//!
//! - `Settings`: The full configuration, loadable from a JSON file
//! - `SettingsBuilder`: Fluent construction for embedding and tests
//! - `ConfigHandle`: Read-only, hot-reloadable view shared by every component
//!
//! Components never cache values read from the handle. Each operation calls
//! `ConfigHandle::current()` so a reload is visible to the next call.

mod error;
mod handle;
mod settings;

pub use error::ConfigError;
pub use handle::ConfigHandle;
pub use settings::{
    GenerationDefaults, ModelCapacity, SearchSettings, Settings, SettingsBuilder,
    TimeoutSettings, WindowSettings,
};
