//! Hot reload of the routing file.
//!
//! The supervisor owns no timers and watches no files: it reacts only to
//! notifications pushed by the signal layer (SIGHUP in production, a plain
//! channel in tests).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::store::ConfigStore;

/// Background task that refreshes a [`ConfigStore`] on request.
pub struct ReloadSupervisor {
    store: Arc<ConfigStore>,
    path: PathBuf,
}

impl ReloadSupervisor {
    pub fn new(store: Arc<ConfigStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Reload once per notification until the sender side is dropped.
    pub async fn run(self, mut notifications: mpsc::Receiver<()>) {
        tracing::info!(path = %self.path.display(), "Reload supervisor started");

        while notifications.recv().await.is_some() {
            self.reload();
        }

        tracing::debug!("Reload channel closed, supervisor exiting");
    }

    /// Reload the file now. Returns whether the new snapshot was published.
    pub fn reload(&self) -> bool {
        let previous = self.store.current();

        match self.store.reload(&self.path) {
            Ok(config) => {
                if config.listen != previous.listen {
                    tracing::warn!(
                        active = %previous.listen,
                        configured = %config.listen,
                        "Listen address changed; it takes effect on restart"
                    );
                }
                tracing::info!(
                    proxy = %config.proxy,
                    forwards = config.forwards.len(),
                    "Configuration reloaded"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload config. Keeping current configuration."
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reloads_on_each_notification() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"Listen":":8080","Proxy":"127.0.0.1:9000"}"#).unwrap();
        let store = Arc::new(ConfigStore::load(file.path()).unwrap());

        let (tx, rx) = mpsc::channel(1);
        let supervisor = ReloadSupervisor::new(Arc::clone(&store), file.path());
        let task = tokio::spawn(supervisor.run(rx));

        std::fs::write(
            file.path(),
            r#"{"Listen":":8080","Proxy":"127.0.0.1:9001","Forwards":["127.0.0.1:9002"]}"#,
        )
        .unwrap();
        tx.send(()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.current().proxy.as_str() != "127.0.0.1:9001" {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reload was not applied");

        drop(tx);
        task.await.unwrap();
        assert_eq!(store.current().forwards.len(), 1);
    }

    #[test]
    fn broken_file_is_ignored() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"Listen":":8080","Proxy":"127.0.0.1:9000"}"#).unwrap();
        let store = Arc::new(ConfigStore::load(file.path()).unwrap());
        let supervisor = ReloadSupervisor::new(Arc::clone(&store), file.path());

        std::fs::write(file.path(), "not json").unwrap();
        assert!(!supervisor.reload());
        assert!(!supervisor.reload());
        assert_eq!(store.current().proxy.as_str(), "127.0.0.1:9000");
    }
}
