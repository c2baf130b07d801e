//! Inbound sockets.
//!
//! ```text
//! Listen address
//!     → listener.rs  bind once, hand out one permit per open connection
//!     → connection.rs  id for logs, counted until the socket closes
//!     → http::server
//! ```
//!
//! The listener is bound at startup only. A reload that changes `Listen`
//! does not move it.

pub mod connection;
pub mod listener;

pub use listener::{Listener, ListenerError};
