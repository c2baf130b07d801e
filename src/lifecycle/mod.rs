//! Process lifecycle.
//!
//! # Flow
//! ```text
//! main.rs:      load config (fatal on error) → bind → spawn reload supervisor → serve
//! signals.rs:   SIGHUP → reload notification
//!               SIGINT / SIGTERM → shutdown
//! shutdown.rs:  watch flag → server stops accepting → open connections drain
//! ```
//!
//! The drain is bounded; connections still open at the deadline are
//! abandoned with the process.

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
