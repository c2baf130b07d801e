//! Deadlines for outbound traffic.
//!
//! Each dial and each exchange with an upstream is bounded by
//! [`DispatchTimeouts`]. A failed dispatch is reported once and never
//! retried.

pub mod timeouts;

pub use timeouts::DispatchTimeouts;
