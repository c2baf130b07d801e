//! Routing configuration.
//!
//! ```text
//! JSON file
//!     → loader.rs      read and deserialize
//!     → validation.rs  every address checked, all problems reported
//!     → store.rs       published as one immutable snapshot
//!
//! SIGHUP
//!     → reload.rs      re-run the pipeline above
//!     → store.rs       swap on success, keep the old snapshot on failure
//! ```
//!
//! Handlers read the snapshot once per request, so a reload never splits
//! a request across two configurations.

pub mod loader;
pub mod reload;
pub mod schema;
pub mod store;
pub mod validation;

pub use loader::ConfigError;
pub use reload::ReloadSupervisor;
pub use schema::{RelayConfig, Target};
pub use store::ConfigStore;
