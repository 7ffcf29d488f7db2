//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, application-relative path)
//!     → table.rs (collect matching filters, look up exact binding)
//!     → matcher.rs (evaluate method sets and path patterns)
//!     → Return: Resolution { filters, Handler | NotFound | MethodNotAllowed }
//!
//! Route Compilation (at publish):
//!     RouteEntry[] (from the handler-discovery layer)
//!     → Reject colliding exact bindings
//!     → Sort filters by index (stable)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per publish, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always resolves to the same chain

pub mod matcher;
pub mod table;

use thiserror::Error;

pub use matcher::{format_allow_header, method_order, normalize_path, MethodSet, PathPattern};
pub use table::{
    ExactBinding, FilterBinding, Resolution, RouteEntry, RouteTable, Target, IMPLICIT_METHODS,
};

/// Errors raised while building a route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("duplicate binding for {method} {path}")]
    DuplicateBinding { path: String, method: String },

    #[error("invalid path pattern '{0}'")]
    InvalidPattern(String),

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
}
