//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every address is `host:port` with a numeric port
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::{RelayConfig, Target};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is missing")]
    Missing { field: &'static str },

    #[error("{field} address {value:?} is not host:port")]
    BadAddress { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_target("Listen", &config.listen, true, &mut errors);
    check_target("Proxy", &config.proxy, false, &mut errors);
    for forward in &config.forwards {
        check_target("Forwards", forward, false, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(
    field: &'static str,
    target: &Target,
    allow_empty_host: bool,
    errors: &mut Vec<ValidationError>,
) {
    if target.as_str().is_empty() {
        errors.push(ValidationError::Missing { field });
        return;
    }

    match target.host_port() {
        Some((host, _)) if !host.is_empty() || allow_empty_host => {}
        _ => errors.push(ValidationError::BadAddress {
            field,
            value: target.to_string(),
        }),
    }
}
