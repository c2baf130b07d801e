//! Shutdown coordination.
//!
//! A `watch` channel rather than a broadcast: a task that subscribes after
//! the trigger still sees it, and dropping [`Shutdown`] counts as a trigger.

use tokio::sync::watch;

/// Owner side. One per process.
#[derive(Debug)]
pub struct Shutdown {
    stopping: watch::Sender<bool>,
}

impl Shutdown {
    /// A coordinator nobody has triggered yet.
    pub fn new() -> Self {
        let (stopping, _) = watch::channel(false);
        Self { stopping }
    }

    /// A handle for one long-running task.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            stopping: self.stopping.subscribe(),
        }
    }

    /// Ask every subscriber to stop. Idempotent.
    pub fn trigger(&self) {
        self.stopping.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber side, held by a task that must stop on shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stopping: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered or the owner is gone.
    pub async fn triggered(&mut self) {
        // An error means the sender was dropped; treat it as a stop.
        let _ = self.stopping.wait_for(|stopping| *stopping).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn resolves(signal: &mut ShutdownSignal) -> bool {
        tokio::time::timeout(Duration::from_millis(200), signal.triggered())
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = first.clone();
        assert!(!resolves(&mut first).await);

        shutdown.trigger();
        assert!(resolves(&mut first).await);
        assert!(resolves(&mut second).await);
    }

    #[tokio::test]
    async fn late_subscriber_still_sees_trigger() {
        let shutdown = Shutdown::default();
        shutdown.trigger();
        shutdown.trigger();

        let mut late = shutdown.subscribe();
        assert!(resolves(&mut late).await);
    }

    #[tokio::test]
    async fn dropping_owner_releases_subscribers() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);
        assert!(resolves(&mut signal).await);
    }
}
