//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the runtime.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the application runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Deployment directories and backup policy.
    pub deploy: DeployConfig,

    /// Minute-bucket statistics settings.
    pub statistics: StatisticsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Deployment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Directory holding deployed archives (`<name>.tar`) and exploded applications.
    pub directory: PathBuf,

    /// Scratch directory archives are extracted into.
    pub work_directory: PathBuf,

    /// Directory holding per-application backup archives.
    pub backup_directory: PathBuf,

    /// Number of prior archive versions kept per application.
    pub max_backups: usize,

    /// Application receiving requests whose first path segment names no application.
    pub default_application: String,

    /// Optional hot-deploy directory watched for new archives.
    pub drop_directory: Option<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("apps"),
            work_directory: PathBuf::from("work"),
            backup_directory: PathBuf::from("backups"),
            max_backups: 10,
            default_application: "root".to_string(),
            drop_directory: None,
        }
    }
}

/// Statistics aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// How long minute buckets are retained, in hours.
    pub retention_hours: u64,

    /// Interval between retention sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            retention_hours: 72,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
