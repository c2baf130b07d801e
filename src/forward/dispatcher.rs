//! Outbound delivery of request copies.
//!
//! # Responsibilities
//! - Open a fresh TCP connection per target per request
//! - Write the request and, when asked, read the full response
//! - Bound every step with a deadline
//!
//! # Design Decisions
//! - No pooling: one slow or broken target can never stall another
//! - Fire-and-forget closes the connection as soon as the request is
//!   flushed; nothing the target sends back is read
//! - Header name case survives in both directions through hyper's
//!   per-message case map

use std::error::Error as StdError;
use std::io;

use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::Target;
use crate::forward::stream::{TrackedBody, TrackedStream, WriteTracker};
use crate::http::request::RequestCopy;
use crate::http::response::ResponseRelay;
use crate::resilience::DispatchTimeouts;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Whether the caller wants the target's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Read and return the full response.
    AwaitResponse,
    /// Close once the request is written; the response is never read.
    FireAndForget,
}

/// Failure delivering to a single target.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("cannot connect to {target}: {source}")]
    Dial {
        target: Target,
        #[source]
        source: io::Error,
    },

    #[error("failed to write request to {target}: {source}")]
    Write {
        target: Target,
        #[source]
        source: BoxError,
    },

    #[error("failed to read response from {target}: {source}")]
    Read {
        target: Target,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Dial { .. } => "dial",
            DispatchError::Write { .. } => "write",
            DispatchError::Read { .. } => "read",
        }
    }
}

fn timed_out(what: &str, limit: std::time::Duration) -> BoxError {
    Box::new(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} within {limit:?}"),
    ))
}

/// Sends request copies to upstream targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardDispatcher {
    timeouts: DispatchTimeouts,
}

impl ForwardDispatcher {
    /// A dispatcher bounding every dial and exchange by `timeouts`.
    pub fn new(timeouts: DispatchTimeouts) -> Self {
        Self { timeouts }
    }

    /// Deliver `copy` to `target`.
    ///
    /// Returns `Some` only in [`DispatchMode::AwaitResponse`]. In
    /// [`DispatchMode::FireAndForget`] the call returns as soon as the
    /// request is flushed, and only dial and write failures are reported.
    /// Any failure or deadline hit before the request is fully written is
    /// a [`DispatchError::Write`].
    pub async fn send(
        &self,
        target: &Target,
        copy: RequestCopy,
        mode: DispatchMode,
    ) -> Result<Option<ResponseRelay>, DispatchError> {
        let (mut sender, writes, mut driver) = self.connect(target).await?;
        let request = copy
            .into_request()
            .map(|body| TrackedBody::new(body, writes.clone()));
        // Queued now; kept alive so hyper does not treat the request as cancelled.
        let response = sender.send_request(request);

        let write_error = |source: BoxError| DispatchError::Write {
            target: target.clone(),
            source,
        };
        let read_error = |source: BoxError| DispatchError::Read {
            target: target.clone(),
            source,
        };

        let outcome = match mode {
            DispatchMode::FireAndForget => {
                let written = timeout(self.timeouts.read, async {
                    tokio::select! {
                        written = writes.settled() => written,
                        _ = &mut driver => writes.outcome().unwrap_or_else(|| {
                            Err(io::Error::new(
                                io::ErrorKind::ConnectionAborted,
                                "connection closed before the request was written",
                            ))
                        }),
                    }
                })
                .await;
                drop(response);

                match written {
                    Ok(Ok(())) => Ok(None),
                    Ok(Err(e)) => Err(write_error(e.into())),
                    Err(_) => Err(write_error(timed_out("request not written", self.timeouts.read))),
                }
            }
            DispatchMode::AwaitResponse => {
                let exchange = async {
                    let head = response.await?;
                    ResponseRelay::read(head).await
                };

                match timeout(self.timeouts.read, exchange).await {
                    Ok(Ok(relay)) => Ok(Some(relay)),
                    Ok(Err(e)) if !writes.written() => Err(write_error(e.into())),
                    Ok(Err(e)) => Err(read_error(e.into())),
                    Err(_) if !writes.written() => {
                        Err(write_error(timed_out("request not written", self.timeouts.read)))
                    }
                    Err(_) => Err(read_error(timed_out("no complete response", self.timeouts.read))),
                }
            }
        };

        driver.abort();
        outcome
    }

    /// Deliver `copy` and wait for the complete response.
    pub async fn forward(
        &self,
        target: &Target,
        copy: RequestCopy,
    ) -> Result<ResponseRelay, DispatchError> {
        match self.send(target, copy, DispatchMode::AwaitResponse).await? {
            Some(relay) => Ok(relay),
            None => Err(DispatchError::Read {
                target: target.clone(),
                source: "connection closed without a response".into(),
            }),
        }
    }

    async fn connect(
        &self,
        target: &Target,
    ) -> Result<(SendRequest<TrackedBody>, WriteTracker, JoinHandle<()>), DispatchError> {
        let dial = |source: io::Error| DispatchError::Dial {
            target: target.clone(),
            source,
        };

        let stream = timeout(self.timeouts.connect, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| {
                dial(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.timeouts.connect),
                ))
            })?
            .map_err(dial)?;

        let (stream, writes) = TrackedStream::new(stream);
        let mut builder = http1::Builder::new();
        builder.preserve_header_case(true);
        let (sender, connection) = builder
            .handshake(TokioIo::new(stream))
            .await
            .map_err(|e| DispatchError::Write {
                target: target.clone(),
                source: e.into(),
            })?;

        let upstream = target.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!(upstream = %upstream, error = %e, "Upstream connection ended with error");
            }
        });

        Ok((sender, writes, driver))
    }
}
