//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (durations > 0)
//! - Detect listeners that would conflict with each other
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::NodeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{first} and {second} both bind {address}")]
    DuplicateAddress {
        first: &'static str,
        second: &'static str,
        address: String,
    },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("admin.api_key must not be empty")]
    EmptyApiKey,
    #[error("store.path must not be empty unless store.in_memory is set")]
    EmptyStorePath,
    #[error("observability.log_level: unknown level '{0}'")]
    UnknownLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut addresses: Vec<(&'static str, SocketAddr)> = Vec::new();
    let mut check_address = |field: &'static str, value: &str, errors: &mut Vec<ValidationError>| {
        let Ok(addr) = value.parse::<SocketAddr>() else {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            return;
        };
        // Port 0 asks the OS for a free port and never conflicts.
        if addr.port() != 0 {
            if let Some((first, _)) = addresses.iter().find(|(_, seen)| *seen == addr) {
                errors.push(ValidationError::DuplicateAddress {
                    first: *first,
                    second: field,
                    address: value.to_string(),
                });
            }
        }
        addresses.push((field, addr));
    };

    check_address("listener.client_address", &config.listener.client_address, &mut errors);
    check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }

    if !config.store.in_memory && config.store.path.trim().is_empty() {
        errors.push(ValidationError::EmptyStorePath);
    }

    let durations = [
        ("shutdown.grace_period_secs", config.shutdown.grace_period_secs),
        ("shutdown.progress_interval_secs", config.shutdown.progress_interval_secs),
        ("shutdown.drain_mode_timeout_secs", config.shutdown.drain_mode_timeout_secs),
        ("shutdown.quit_timeout_secs", config.shutdown.quit_timeout_secs),
        ("store.heartbeat_interval_ms", config.store.heartbeat_interval_ms),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
