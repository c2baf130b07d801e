//! Configuration schema definitions.
//!
//! The routing file is a flat JSON object:
//!
//! ```json
//! { "Listen": ":8080", "Proxy": "127.0.0.1:9000", "Forwards": ["127.0.0.1:9001"] }
//! ```
//!
//! Unknown keys are ignored. `Forwards` may be empty, absent or `null`.

use serde::{Deserialize, Deserializer, Serialize};

/// An outbound or listening endpoint in `host:port` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Wrap an address without checking it; see `validation`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The address as written in the config file.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into host and port. `None` unless the port is numeric.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let (host, port) = self.0.rsplit_once(':')?;
        let port = port.parse().ok()?;
        Some((host.trim_start_matches('[').trim_end_matches(']'), port))
    }

    /// Addresses to try, in order, when binding a listener.
    ///
    /// A missing host (`":8080"`) means every interface: the IPv6 wildcard
    /// first, which also takes IPv4 where the OS allows dual-stack sockets,
    /// then the IPv4 wildcard for hosts without IPv6.
    pub fn bind_candidates(&self) -> Vec<String> {
        if self.0.starts_with(':') {
            vec![format!("[::]{}", self.0), format!("0.0.0.0{}", self.0)]
        } else {
            vec![self.0.clone()]
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

/// Routing configuration for the relay.
///
/// A loaded `RelayConfig` is never mutated; reloads replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Address the relay accepts connections on.
    #[serde(rename = "Listen", default)]
    pub listen: Target,

    /// Primary upstream whose responses are relayed to callers.
    #[serde(rename = "Proxy", default)]
    pub proxy: Target,

    /// Shadow upstreams that receive copies; their responses are discarded.
    #[serde(rename = "Forwards", default, deserialize_with = "nullable_targets")]
    pub forwards: Vec<Target>,
}

impl RelayConfig {
    /// Number of outbound connections a single inbound request produces.
    pub fn fan_out(&self) -> usize {
        1 + self.forwards.len()
    }
}

fn nullable_targets<'de, D>(deserializer: D) -> Result<Vec<Target>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Target>>::deserialize(deserializer)?.unwrap_or_default())
}
