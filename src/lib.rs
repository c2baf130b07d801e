//! Shadow relay: an HTTP/1 relay that answers from one primary upstream
//! while mirroring every request to shadow upstreams.

pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::{ConfigStore, RelayConfig, ReloadSupervisor, Target};
pub use forward::{DispatchMode, ForwardDispatcher};
pub use http::{ProxyHandler, RelayServer};
pub use lifecycle::Shutdown;
