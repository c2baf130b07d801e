//! Atomically swapped configuration snapshot.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::RelayConfig;
use crate::observability::metrics;

/// Holds the active [`RelayConfig`].
///
/// Readers never block and always see one complete snapshot. Writers
/// replace the whole snapshot; a failed reload leaves it untouched.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<RelayConfig>,
}

impl ConfigStore {
    /// A store holding `config` as its first snapshot.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Initial load at startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_config(path).map(Self::new)
    }

    /// The latest fully loaded snapshot.
    pub fn current(&self) -> Arc<RelayConfig> {
        self.current.load_full()
    }

    /// Swap in `config`, returning the snapshot it replaced.
    pub fn replace(&self, config: RelayConfig) -> Arc<RelayConfig> {
        self.current.swap(Arc::new(config))
    }

    /// Re-read `path` and publish it if it loads cleanly.
    pub fn reload(&self, path: &Path) -> Result<Arc<RelayConfig>, ConfigError> {
        let result = load_config(path).map(|config| {
            let config = Arc::new(config);
            self.current.store(Arc::clone(&config));
            config
        });
        metrics::record_reload(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Target;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config(generation: u16) -> RelayConfig {
        RelayConfig {
            listen: Target::new(format!(":{}", 8000 + generation)),
            proxy: Target::new(format!("127.0.0.1:{}", 9000 + generation)),
            forwards: vec![Target::new(format!("127.0.0.1:{}", 10000 + generation))],
        }
    }

    fn write_config(file: &tempfile::NamedTempFile, body: &str) {
        std::fs::write(file.path(), body).unwrap();
    }

    #[test]
    fn reload_publishes_new_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, r#"{"Listen":":8080","Proxy":"127.0.0.1:9000"}"#);
        let store = ConfigStore::load(file.path()).unwrap();
        assert!(store.current().forwards.is_empty());

        write_config(
            &file,
            r#"{"Listen":":8080","Proxy":"127.0.0.1:9100","Forwards":["127.0.0.1:9101"]}"#,
        );
        let loaded = store.reload(file.path()).unwrap();

        assert_eq!(store.current(), loaded);
        assert_eq!(store.current().proxy.as_str(), "127.0.0.1:9100");
        assert_eq!(store.current().forwards.len(), 1);
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, r#"{"Listen":":8080","Proxy":"127.0.0.1:9000"}"#);
        let store = ConfigStore::load(file.path()).unwrap();
        let before = store.current();

        write_config(&file, r#"{"Listen":":8080","Proxy":"#);
        assert!(matches!(store.reload(file.path()), Err(ConfigError::Parse(_))));
        assert!(Arc::ptr_eq(&before, &store.current()));

        let missing = file.path().with_extension("gone");
        assert!(matches!(store.reload(&missing), Err(ConfigError::Io { .. })));
        assert!(Arc::ptr_eq(&before, &store.current()));
    }

    #[test]
    fn replace_returns_previous() {
        let store = ConfigStore::new(config(1));
        let previous = store.replace(config(2));
        assert_eq!(*previous, config(1));
        assert_eq!(*store.current(), config(2));
    }

    #[test]
    fn readers_never_observe_mixed_snapshots() {
        let store = Arc::new(ConfigStore::new(config(0)));
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let snapshot = store.current();
                        let (_, listen) = snapshot.listen.host_port().unwrap();
                        let (_, proxy) = snapshot.proxy.host_port().unwrap();
                        let (_, forward) = snapshot.forwards[0].host_port().unwrap();
                        assert_eq!(proxy - 1000, listen);
                        assert_eq!(forward - 2000, listen);
                    }
                })
            })
            .collect();

        for generation in 1..500 {
            store.replace(config(generation % 50));
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
