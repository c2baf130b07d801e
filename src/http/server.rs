//! HTTP server setup.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Serve each connection with hyper's HTTP/1 connection driver
//! - Route every request through the [`ProxyHandler`]
//! - Stop accepting on shutdown and drain open connections
//!
//! hyper is driven directly rather than through a router: when the handler
//! aborts, the service error makes hyper close the socket without a reply.
//! Header name case is recorded on the way in and no `date` header is
//! added on the way out, so the caller sees the primary's header block as
//! the primary wrote it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::ConfigStore;
use crate::forward::ForwardDispatcher;
use crate::http::handler::ProxyHandler;
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The relay's inbound side.
pub struct RelayServer {
    handler: ProxyHandler,
    connections: ConnectionTracker,
    drain_timeout: Duration,
}

impl RelayServer {
    /// A server routing through `store` and forwarding with `dispatcher`.
    pub fn new(store: Arc<ConfigStore>, dispatcher: ForwardDispatcher) -> Self {
        Self {
            handler: ProxyHandler::new(store, dispatcher),
            connections: ConnectionTracker::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// How long to wait for open connections after shutdown is triggered.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                max_connections = listener.max_connections(),
                "Relay server starting"
            );
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.serve(stream, peer, permit),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.triggered() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(self.drain_timeout, self.connections.wait_until_idle()).await;
        if drained.is_err() {
            tracing::warn!(
                open_connections = self.connections.active_count(),
                "Drain deadline passed with connections still open"
            );
        }

        tracing::info!("Relay server stopped");
        Ok(())
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.connections.track();
        let span = tracing::debug_span!("connection", id = %guard.id(), peer = %peer);
        let handler = self.handler.clone();

        tokio::spawn(
            async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let handler = handler.clone();
                    async move { handler.handle(request).await }
                });

                let mut builder = http1::Builder::new();
                builder.preserve_header_case(true).auto_date_header(false);
                if let Err(e) = builder.serve_connection(TokioIo::new(stream), service).await {
                    tracing::debug!(error = %e, "Connection closed with error");
                }

                drop(permit);
                drop(guard);
            }
            .instrument(span),
        );
    }
}
