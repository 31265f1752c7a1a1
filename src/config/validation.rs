//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, limits > 0)
//! - Validate the log level
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::MonitorConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Check `config` for values the monitor cannot run with.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let endpoint = &config.endpoint;

    if endpoint.limiting && endpoint.limit == 0 {
        errors.push(ValidationError::new(
            "endpoint.limit",
            "must be greater than zero when limiting is enabled",
        ));
    }
    if endpoint.caching && endpoint.cache_duration_secs == 0 {
        errors.push(ValidationError::new(
            "endpoint.cache_duration_secs",
            "must be greater than zero when caching is enabled",
        ));
    }
    for (field, value) in [
        ("endpoint.online_reconnection_interval_secs", endpoint.online_reconnection_interval_secs),
        ("endpoint.offline_reconnection_interval_secs", endpoint.offline_reconnection_interval_secs),
        ("endpoint.acceptable_call_duration_secs", endpoint.acceptable_call_duration_secs),
        ("polling.interval_secs", config.polling.interval_secs),
        ("polling.timeout_secs", config.polling.timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
