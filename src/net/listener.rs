//! The relay's listening socket.
//!
//! Accepting is gated by a semaphore: once `max_connections` sockets are
//! open, further clients wait in the kernel backlog until one closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Target;

/// Binding or accepting failed.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("connection limiter closed")]
    Closed,
}

/// TCP listener with a cap on open connections.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to `target` with at most `max_connections` open at once.
    pub async fn bind(target: &Target, max_connections: usize) -> Result<Self, ListenerError> {
        let mut failure = None;
        let mut bound = None;
        for address in target.bind_candidates() {
            match TcpListener::bind(&address).await {
                Ok(socket) => {
                    bound = Some(socket);
                    break;
                }
                Err(source) => {
                    tracing::debug!(address = %address, error = %source, "Bind attempt failed");
                    failure = Some(ListenerError::Bind { address, source });
                }
            }
        }
        let socket = match (bound, failure) {
            (Some(socket), _) => socket,
            (None, Some(e)) => return Err(e),
            (None, None) => {
                return Err(ListenerError::Bind {
                    address: target.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no address to bind"),
                })
            }
        };

        if let Ok(bound) = socket.local_addr() {
            tracing::info!(address = %bound, max_connections, "Listening");
        }

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Wait for a free slot, then for the next client.
    ///
    /// Keep the permit alive for as long as the connection is served.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(peer = %peer, free_slots = self.available_permits(), "Accepted");
        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    /// The address actually bound, with the real port for `:0`.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Connections that can still be accepted right now.
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    /// The cap given at bind time.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// One occupied connection slot, freed on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
