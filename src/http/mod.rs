//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 connection per accepted socket)
//!     → handler.rs (relay state machine, fault boundary)
//!     → request.rs (capture body once, materialize per-target copies)
//!     → [forward::ForwardDispatcher sends copies]
//!     → response.rs (primary reply copied back to the caller)
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{ProxyHandler, RelayError};
pub use request::{BodyReadError, RequestCopy, RequestSnapshot};
pub use response::ResponseRelay;
pub use server::RelayServer;
