//! Per-request relay logic.
//!
//! ```text
//! Start ─capture─▶ BodyCaptured ─fan out─▶ Dispatching ─primary ok─▶ RelayingResponse ─▶ Done
//!   │                                         │
//!   └── body read fails ──▶ Aborted ◀── primary fails
//! ```
//!
//! An aborted request surfaces as an `Err` from the hyper service, which
//! makes hyper drop the connection without writing a response.

use std::any::Any;
use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ConfigStore, Target};
use crate::forward::{DispatchError, DispatchMode, ForwardDispatcher};
use crate::http::request::{BodyReadError, RequestCopy, RequestSnapshot};
use crate::observability::metrics;

/// Why a request was aborted.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    BodyRead(#[from] BodyReadError),

    #[error("primary dispatch failed: {0}")]
    Primary(#[source] DispatchError),

    #[error("internal fault: {0}")]
    Internal(String),
}

impl RelayError {
    fn outcome(&self) -> &'static str {
        match self {
            RelayError::BodyRead(_) => "body_read_error",
            RelayError::Primary(_) => "primary_error",
            RelayError::Internal(_) => "internal_error",
        }
    }
}

/// Duplicates each inbound request to the configured targets and relays
/// the primary's reply.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    store: Arc<ConfigStore>,
    dispatcher: ForwardDispatcher,
}

impl ProxyHandler {
    /// A handler reading routes from `store` on every request.
    pub fn new(store: Arc<ConfigStore>, dispatcher: ForwardDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Handle one inbound request.
    ///
    /// Any panic while relaying is caught and reported as
    /// [`RelayError::Internal`]; it never escapes to the connection task.
    pub async fn handle<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>, RelayError>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let start = Instant::now();
        let span = tracing::info_span!(
            "relay",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        );

        let result = contain_faults(self.relay(request)).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(response) => {
                metrics::record_request("relayed", start);
                tracing::debug!(
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Primary response relayed"
                );
            }
            Err(e) => {
                metrics::record_request(e.outcome(), start);
                tracing::warn!(error = %e, "Request aborted without response");
            }
        });

        result
    }

    async fn relay<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>, RelayError>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let snapshot = RequestSnapshot::capture(request).await?;

        // One snapshot for the whole request, even if a reload lands mid-flight.
        let config = self.store.current();
        tracing::debug!(
            body_bytes = snapshot.body().len(),
            primary = %config.proxy,
            outbound = config.fan_out(),
            "Body captured, dispatching"
        );

        for shadow in &config.forwards {
            self.spawn_shadow(shadow.clone(), snapshot.materialize());
        }

        let relay = match self.dispatcher.forward(&config.proxy, snapshot.materialize()).await {
            Ok(relay) => {
                metrics::record_dispatch("primary", "ok");
                relay
            }
            Err(e) => {
                metrics::record_dispatch("primary", e.kind());
                return Err(RelayError::Primary(e));
            }
        };

        Ok(relay.into_response())
    }

    /// Detached delivery to a shadow target. Its outcome is only logged.
    fn spawn_shadow(&self, target: Target, copy: RequestCopy) {
        let dispatcher = self.dispatcher;
        tokio::spawn(
            async move {
                match dispatcher.send(&target, copy, DispatchMode::FireAndForget).await {
                    Ok(_) => {
                        metrics::record_dispatch("shadow", "ok");
                        tracing::debug!(shadow = %target, "Shadow copy delivered");
                    }
                    Err(e) => {
                        metrics::record_dispatch("shadow", e.kind());
                        tracing::debug!(shadow = %target, error = %e, "Shadow delivery failed");
                    }
                }
            }
            .in_current_span(),
        );
    }
}

/// Run `future`, turning a panic into [`RelayError::Internal`].
pub async fn contain_faults<F, T>(future: F) -> Result<T, RelayError>
where
    F: Future<Output = Result<T, RelayError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(RelayError::Internal(panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
