//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - The read deadline covers writing the request and reading the full response

use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadlines applied to every outbound dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimeouts {
    /// Bound on establishing the TCP connection.
    pub connect: Duration,
    /// Bound on exchanging the request and response once connected.
    pub read: Duration,
}

impl DispatchTimeouts {
    /// Deadlines given in whole seconds.
    pub fn from_secs(connect_secs: u64, read_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            read: Duration::from_secs(read_secs),
        }
    }
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ten_seconds() {
        let timeouts = DispatchTimeouts::default();
        assert_eq!(timeouts, DispatchTimeouts::from_secs(10, 10));
    }
}
