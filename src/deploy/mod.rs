//! Live deployment subsystem.
//!
//! # Data Flow
//! ```text
//! Admin API / drop-directory watcher / startup recovery
//!     → manager.rs (per-name lock, validate, stage)
//!     → extract.rs (archive → work directory)
//!     → loader.rs (app.toml + HandlerCatalog → Application)
//!     → registry.rs (single pointer store into the slot)
//!
//! Dispatcher:
//!     → registry.rs lookup (atomic load) → Arc<Application> for the request
//! ```
//!
//! # Design Decisions
//! - Applications are immutable; publishing swaps an `Arc`
//! - Requests keep the version they loaded until they complete
//! - Backups exist only for archive deployments, newest first, bounded
//! - Operations on different names never wait on each other

pub mod application;
pub mod backup;
pub mod catalog;
pub mod extract;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod watcher;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use application::{Application, ApplicationSource};
pub use backup::{BackupEntry, BackupHistory};
pub use catalog::HandlerCatalog;
pub use extract::{ArchiveExtractor, TarExtractor};
pub use loader::{ApplicationLoader, ManifestLoader, MANIFEST_FILE};
pub use manager::{ApplicationStatus, DeploySource, DeploymentManager, RecoveryReport};
pub use registry::{Registry, RegistrySlot};
pub use watcher::DropWatcher;

/// Errors raised by deployment operations. The registry is unchanged when one is returned.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("application '{0}' already exists")]
    AlreadyExists(String),

    #[error("application '{0}' not found")]
    NotFound(String),

    #[error("no backup available for application {0}")]
    NoBackup(String),

    #[error("invalid application name '{0}'")]
    InvalidName(String),

    #[error("invalid archive '{}': {reason}", .path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("failed to build application '{name}': {reason}")]
    BuildFailure { name: String, reason: String },

    #[error("I/O failure ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DeploymentError {
    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }

    pub(crate) fn build(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::BuildFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DeploymentError::AlreadyExists("shop".into()).to_string(),
            "application 'shop' already exists"
        );
        assert_eq!(
            DeploymentError::build("shop", "unknown handler 'x'").to_string(),
            "failed to build application 'shop': unknown handler 'x'"
        );
        let io = DeploymentError::io(
            "copy archive",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.to_string(), "I/O failure (copy archive): denied");
    }
}
