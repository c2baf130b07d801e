//! Inbound connection accounting.
//!
//! Every accepted socket gets a [`ConnectionId`] for log correlation and a
//! [`ConnectionGuard`] that keeps it counted until the socket's task ends.
//! Shutdown waits on the count reaching zero.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::observability::metrics;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of an inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counter {
    open: AtomicU64,
    idle: Notify,
}

/// Counts open inbound connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counter: Arc<Counter>,
}

impl ConnectionTracker {
    /// A tracker with nothing open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        let open = self.counter.open.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(open);

        ConnectionGuard {
            counter: Arc::clone(&self.counter),
            id: ConnectionId::next(),
        }
    }

    /// Connections currently open.
    pub fn active_count(&self) -> u64 {
        self.counter.open.load(Ordering::SeqCst)
    }

    /// Resolve once no tracked connection remains open.
    pub async fn wait_until_idle(&self) {
        loop {
            // Register before checking so a release in between is not missed.
            let released = self.counter.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            released.await;
        }
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    counter: Arc<Counter>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Id of the tracked connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let open = self.counter.open.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(open);
        if open == 0 {
            self.counter.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, open, "Connection released");
    }
}
