//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Detect conflicting directory layouts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RuntimeConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("deploy.{first} and deploy.{second} must be different directories")]
    SharedDirectory {
        first: &'static str,
        second: &'static str,
    },

    #[error("admin.api_key must be changed when the admin API is enabled")]
    DefaultApiKey,
}

/// Check a parsed configuration, collecting every violation.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_body_bytes" });
    }

    let deploy = &config.deploy;
    if deploy.max_backups == 0 {
        errors.push(ValidationError::Zero { field: "deploy.max_backups" });
    }
    if deploy.default_application.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "deploy.default_application" });
    }
    let dirs = [
        ("directory", &deploy.directory),
        ("work_directory", &deploy.work_directory),
        ("backup_directory", &deploy.backup_directory),
    ];
    for (i, (first, a)) in dirs.iter().enumerate() {
        for (second, b) in dirs.iter().skip(i + 1) {
            if a == b {
                errors.push(ValidationError::SharedDirectory { first, second });
            }
        }
    }
    if let Some(drop) = &deploy.drop_directory {
        if drop == &deploy.directory {
            errors.push(ValidationError::SharedDirectory {
                first: "drop_directory",
                second: "directory",
            });
        }
    }

    if config.statistics.retention_hours == 0 {
        errors.push(ValidationError::Zero { field: "statistics.retention_hours" });
    }
    if config.statistics.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "statistics.sweep_interval_secs" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::Empty { field: "admin.api_key" });
        } else if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            errors.push(ValidationError::DefaultApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
