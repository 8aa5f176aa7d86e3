use anyhow::{Context as _, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use super::{resolve_config_file, AppConfig, LoggingConfig};

/// Live configuration, reloaded whenever the backing file changes.
pub struct ConfigWatcher {
    config: Arc<RwLock<AppConfig>>,
    _watcher: Option<RecommendedWatcher>,
    reload_tx: broadcast::Sender<AppConfig>,
}

impl ConfigWatcher {
    /// Starts watching the file `config_path` resolves to. Must be called from
    /// within a tokio runtime.
    pub fn new(config_path: &str, initial_config: AppConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .context("config watcher must be created inside a tokio runtime")?;
        let watched = resolve_config_file(config_path)
            .with_context(|| format!("no configuration file found for {config_path}"))?;

        let config = Arc::new(RwLock::new(initial_config));
        let (reload_tx, _) = broadcast::channel(16);

        let config_clone = config.clone();
        let reload_tx_clone = reload_tx.clone();
        let path = config_path.to_string();

        // notify invokes this on its own thread, so the update is handed to the runtime.
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if event.kind.is_modify() => {
                    info!(path = %path, "Configuration file changed, reloading");

                    match AppConfig::load_from(&path) {
                        Ok(new_config) => {
                            let config = config_clone.clone();
                            let reload_tx = reload_tx_clone.clone();
                            handle.spawn(async move {
                                publish(&config, &reload_tx, new_config).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to reload configuration, keeping previous: {:#}", e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
            Config::default(),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        info!("Started watching configuration file: {}", watched.display());

        Ok(ConfigWatcher {
            config,
            _watcher: Some(watcher),
            reload_tx,
        })
    }

    /// A watcher with no backing file. The config only changes through [`ConfigWatcher::apply`].
    pub fn unwatched(config: AppConfig) -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        ConfigWatcher {
            config: Arc::new(RwLock::new(config)),
            _watcher: None,
            reload_tx,
        }
    }

    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    pub async fn logging_config(&self) -> LoggingConfig {
        self.config.read().await.logging.clone()
    }

    /// Replaces the live config and notifies subscribers.
    pub async fn apply(&self, new_config: AppConfig) {
        publish(&self.config, &self.reload_tx, new_config).await;
    }

    pub fn subscribe_to_reloads(&self) -> broadcast::Receiver<AppConfig> {
        self.reload_tx.subscribe()
    }
}

async fn publish(
    config: &RwLock<AppConfig>,
    reload_tx: &broadcast::Sender<AppConfig>,
    new_config: AppConfig,
) {
    *config.write().await = new_config.clone();

    if reload_tx.send(new_config).is_err() {
        warn!("No active config reload subscribers");
    } else {
        info!("Configuration reloaded successfully");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn apply_replaces_config_and_notifies() {
        let watcher = ConfigWatcher::unwatched(AppConfig::default());
        let mut reloads = watcher.subscribe_to_reloads();

        let mut updated = AppConfig::default();
        updated.logging.enabled = false;
        watcher.apply(updated.clone()).await;

        assert!(!watcher.logging_config().await.enabled);
        assert_eq!(reloads.recv().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn apply_without_subscribers_still_updates() {
        let watcher = ConfigWatcher::unwatched(AppConfig::default());

        let mut updated = AppConfig::default();
        updated.logging.max_logged_body_bytes = Some(10);
        watcher.apply(updated).await;

        assert_eq!(watcher.get_config().await.logging.max_logged_body_bytes, Some(10));
    }

    #[tokio::test]
    async fn extensionless_path_is_watched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.yaml"), "logging:\n  enabled: true\n").unwrap();
        let bare = dir.path().join("app");
        let missing = dir.path().join("nope");

        assert!(ConfigWatcher::new(bare.to_str().unwrap(), AppConfig::default()).is_ok());
        assert!(ConfigWatcher::new(missing.to_str().unwrap(), AppConfig::default()).is_err());
    }

    #[tokio::test]
    async fn file_change_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, "logging:\n  enabled: true\n").unwrap();
        let path = path.to_str().unwrap().to_string();

        let watcher = ConfigWatcher::new(&path, AppConfig::load_from(&path).unwrap()).unwrap();
        let mut reloads = watcher.subscribe_to_reloads();

        std::fs::write(&path, "logging:\n  enabled: false\n").unwrap();

        let reloaded = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let config = reloads.recv().await.unwrap();
                if !config.logging.enabled {
                    break config;
                }
            }
        })
        .await
        .expect("no reload observed");

        assert!(!reloaded.logging.enabled);
        assert!(!watcher.logging_config().await.enabled);
    }
}
