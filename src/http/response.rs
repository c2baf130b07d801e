//! Primary response capture and relay.
//!
//! # Design Decisions
//! - The primary's reply is buffered in full before anything reaches the caller
//! - Status and every header pass through; only chunked framing is rewritten
//! - Response extensions pass through too, so the upstream's header name
//!   case and reason phrase reach the caller unchanged

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::http::Extensions;
use hyper::{HeaderMap, Response, StatusCode};

/// A complete upstream response held in memory.
#[derive(Debug, Clone)]
pub struct ResponseRelay {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub extensions: Extensions,
    pub body: Bytes,
}

impl ResponseRelay {
    /// Read `response` to the end.
    pub async fn read<B: Body>(response: Response<B>) -> Result<Self, B::Error> {
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            extensions: parts.extensions,
            body,
        })
    }

    /// Reproduce the upstream reply for the caller.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut headers = self.headers;
        if headers.remove(TRANSFER_ENCODING).is_some() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }

        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        *response.extensions_mut() = self.extensions;
        response
    }
}
