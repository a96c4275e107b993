//! Hot-reloadable settings handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ConfigError;
use super::settings::Settings;

/// Shared, read-only view of the live settings
///
/// Cloning the handle is cheap and every clone observes reloads.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<Settings>>>,
}

impl ConfigHandle {
    /// Install validated settings
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let (tx, _rx) = watch::channel(Arc::new(settings));
        Ok(Self { tx: Arc::new(tx) })
    }

    /// Load and install settings from a JSON file
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let settings = Settings::read_config(path.into()).await?;
        Self::new(settings)
    }

    /// The settings in effect right now
    pub fn current(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    /// Receive a notification on every reload
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    /// Replace the live settings. Invalid settings leave the current ones in place.
    pub fn reload(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.tx.send_replace(Arc::new(settings));
        info!("configuration reloaded");
        Ok(())
    }

    /// Poll `path` and reload whenever its parsed contents differ from the live settings.
    ///
    /// The task runs until aborted. Unreadable or invalid files are logged once per
    /// distinct failure and otherwise ignored.
    pub fn watch_file(&self, path: impl Into<PathBuf>, poll: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        let path = path.into();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            let mut last_failure: Option<String> = None;
            loop {
                ticker.tick().await;
                let result = match Settings::read_config(&path).await {
                    Ok(settings) if settings == *handle.current() => Ok(()),
                    Ok(settings) => handle.reload(settings),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => last_failure = None,
                    Err(e) => {
                        let message = e.to_string();
                        if last_failure.as_deref() != Some(message.as_str()) {
                            warn!(path = %path.display(), error = %message, "ignoring config file");
                            last_failure = Some(message);
                        } else {
                            debug!(path = %path.display(), "config file still invalid");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_initial_settings_are_rejected() {
        let settings = Settings::builder().safety_buffer(0.0).build();
        assert!(ConfigHandle::new(settings).is_err());
    }

    #[test]
    fn reload_is_visible_through_every_clone() {
        let handle = ConfigHandle::new(Settings::default()).unwrap();
        let other = handle.clone();

        handle
            .reload(Settings::builder().safety_buffer(0.5).build())
            .unwrap();

        assert_eq!(other.current().safety_buffer, 0.5);
    }

    #[test]
    fn invalid_reload_keeps_previous_settings() {
        let handle = ConfigHandle::new(Settings::default()).unwrap();
        let result = handle.reload(Settings::builder().message_limit(0).build());

        assert!(result.is_err());
        assert_eq!(handle.current().message_limit, 2000);
    }

    #[tokio::test]
    async fn watch_file_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        tokio::fs::write(&path, r#"{"safety_buffer": 0.9}"#)
            .await
            .unwrap();

        let handle = ConfigHandle::from_file(&path).await.unwrap();
        let mut changes = handle.subscribe();
        let watcher = handle.watch_file(&path, Duration::from_millis(10));

        tokio::fs::write(&path, r#"{"safety_buffer": 0.4}"#)
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), changes.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handle.current().safety_buffer, 0.4);
        watcher.abort();
    }
}
