//! Logs and metrics.
//!
//! ```text
//! handler, dispatcher, reload, net
//!     → logging.rs  tracing events inside per-connection and per-request spans
//!     → metrics.rs  counters and gauges, scraped only when an exporter runs
//! ```
//!
//! Shadow outcomes surface here and nowhere else; callers never see them.

pub mod logging;
pub mod metrics;
