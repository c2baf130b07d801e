//! Outbound forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! RequestCopy
//!     → dispatcher.rs (dial with deadline, hyper http1 handshake)
//!     → stream.rs (socket wrapper that records write failures)
//!     → upstream target
//!     → ResponseRelay (AwaitResponse) or nothing (FireAndForget)
//! ```
//!
//! # Design Decisions
//! - Every dispatch owns its connection; nothing is pooled or shared
//! - Errors stay local to the dispatch that produced them

pub mod dispatcher;
pub mod stream;

pub use dispatcher::{DispatchError, DispatchMode, ForwardDispatcher};
