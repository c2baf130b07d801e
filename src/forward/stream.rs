//! Write tracking for one outbound exchange.
//!
//! hyper reports write and read failures through the same error type and
//! gives no signal once a request has left the buffer. [`TrackedStream`]
//! and [`TrackedBody`] share a [`WriteTracker`] that records both: the body
//! marks when hyper has taken its last frame, and the next successful flush
//! of the socket means the whole request was written.

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct WriteState {
    body_queued: AtomicBool,
    written: AtomicBool,
    failure: OnceLock<(io::ErrorKind, String)>,
    settled: Notify,
}

/// Shared view of how far an outbound request got.
#[derive(Debug, Clone, Default)]
pub struct WriteTracker(Arc<WriteState>);

impl WriteTracker {
    /// Whether a socket write or flush failed.
    pub fn failed(&self) -> bool {
        self.0.failure.get().is_some()
    }

    /// Whether the complete request reached the socket.
    pub fn written(&self) -> bool {
        self.0.written.load(Ordering::Acquire)
    }

    /// `Some` once the request was written or a write failed.
    pub fn outcome(&self) -> Option<io::Result<()>> {
        if let Some((kind, message)) = self.0.failure.get() {
            Some(Err(io::Error::new(*kind, message.clone())))
        } else if self.written() {
            Some(Ok(()))
        } else {
            None
        }
    }

    /// Wait until [`outcome`](Self::outcome) is known.
    pub async fn settled(&self) -> io::Result<()> {
        loop {
            let notified = self.0.settled.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn mark_body_queued(&self) {
        self.0.body_queued.store(true, Ordering::Release);
    }

    fn mark_flushed(&self) {
        if self.0.body_queued.load(Ordering::Acquire) && !self.0.written.swap(true, Ordering::AcqRel) {
            self.0.settled.notify_waiters();
        }
    }

    fn mark_failed(&self, error: &io::Error) {
        if self.0.failure.set((error.kind(), error.to_string())).is_ok() {
            self.0.settled.notify_waiters();
        }
    }
}

/// Socket wrapper feeding a [`WriteTracker`].
#[derive(Debug)]
pub struct TrackedStream {
    inner: TcpStream,
    tracker: WriteTracker,
}

impl TrackedStream {
    /// Wrap `inner` with a fresh tracker.
    pub fn new(inner: TcpStream) -> (Self, WriteTracker) {
        let tracker = WriteTracker::default();
        (
            Self {
                inner,
                tracker: tracker.clone(),
            },
            tracker,
        )
    }

    fn observe<T>(&self, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        if let Poll::Ready(Err(e)) = &poll {
            self.tracker.mark_failed(e);
        }
        poll
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        self.observe(poll)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        self.observe(poll)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_flush(cx);
        if let Poll::Ready(Ok(())) = poll {
            self.tracker.mark_flushed();
        }
        self.observe(poll)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Request body that tells its [`WriteTracker`] when hyper has taken all of it.
///
/// hyper asks `is_end_stream` before writing a bodyless head and after each
/// data frame, so the mark lands before the final bytes are buffered.
#[derive(Debug)]
pub struct TrackedBody {
    inner: Full<Bytes>,
    tracker: WriteTracker,
}

impl TrackedBody {
    /// Report the end of `inner` to `tracker`.
    pub fn new(inner: Full<Bytes>, tracker: WriteTracker) -> Self {
        Self { inner, tracker }
    }
}

impl Body for TrackedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let frame = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(None) = frame {
            self.tracker.mark_body_queued();
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        let end = self.inner.is_end_stream();
        if end {
            self.tracker.mark_body_queued();
        }
        end
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
