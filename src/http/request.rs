//! Request capture and replication.
//!
//! # Responsibilities
//! - Read an inbound request body exactly once
//! - Hand out independent copies, one per upstream target
//! - Fix up framing headers for the buffered body
//!
//! # Design Decisions
//! - The body is held in one `Bytes` buffer; every copy is a refcounted view
//! - Headers are shared behind an `Arc` and cloned only when a copy mutates them
//! - Method, URI, version and all other headers pass through untouched
//! - Request extensions travel with every copy; hyper keeps the original
//!   header name case there and writes it back out on the outbound side

use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::http::Extensions;
use hyper::{HeaderMap, Method, Request, Uri, Version};

/// The inbound body could not be read to the end.
#[derive(Debug, thiserror::Error)]
#[error("failed to read request body: {0}")]
pub struct BodyReadError(#[source] pub Box<dyn StdError + Send + Sync>);

/// An inbound request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    uri: Uri,
    version: Version,
    headers: Arc<HeaderMap>,
    extensions: Extensions,
    body: Bytes,
}

impl RequestSnapshot {
    /// Drain `request`'s body into memory. The original body is dropped
    /// once fully read.
    pub async fn capture<B>(request: Request<B>) -> Result<Self, BodyReadError>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| BodyReadError(e.into()))?
            .to_bytes();

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: Arc::new(parts.headers),
            extensions: parts.extensions,
            body,
        })
    }

    /// Request method as received.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target as received, origin or absolute form.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// HTTP version as received.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Inbound headers, including framing headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// A new copy positioned at the start of the shared body.
    pub fn materialize(&self) -> RequestCopy {
        RequestCopy {
            method: self.method.clone(),
            uri: self.uri.clone(),
            version: self.version,
            headers: Arc::clone(&self.headers),
            extensions: self.extensions.clone(),
            body: self.body.clone(),
        }
    }
}

/// One target's private view of a [`RequestSnapshot`].
#[derive(Debug, Clone)]
pub struct RequestCopy {
    method: Method,
    uri: Uri,
    version: Version,
    headers: Arc<HeaderMap>,
    extensions: Extensions,
    body: Bytes,
}

impl RequestCopy {
    /// Method sent upstream.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target sent upstream.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Headers as they stand before framing is fixed up.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers. Detaches this copy from the shared map first.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        Arc::make_mut(&mut self.headers)
    }

    /// This copy's view of the shared body buffer.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Build the outbound request.
    ///
    /// The body is already buffered, so chunked framing is replaced with an
    /// exact `Content-Length`. Outbound connections are never reused, hence
    /// `Connection: close`.
    pub fn into_request(self) -> Request<Full<Bytes>> {
        let mut headers = Arc::unwrap_or_clone(self.headers);

        let framed = headers.contains_key(CONTENT_LENGTH) || headers.contains_key(TRANSFER_ENCODING);
        headers.remove(TRANSFER_ENCODING);
        if framed || !self.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let mut request = Request::new(Full::new(self.body));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = headers;
        *request.extensions_mut() = self.extensions;
        request
    }
}
