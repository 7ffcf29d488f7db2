//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request (from the transport adapter)
//!     → Registry lookup (first path segment → live Application)
//!     → RouteTable::resolve (filters + target)
//!     → filters in index order (each may short-circuit)
//!     → negotiate serializer (406) / deserializer (415)
//!     → handler → Reply → Response
//!     → HttpStatistics::record (exactly once)
//! ```
//!
//! # Design Decisions
//! - Each request pins the application version it resolved against
//! - No lock is held while handler code runs
//! - Handler failures and panics become 500 responses, never escape the core
//! - OPTIONS/TRACE/HEAD are answered here for any known path

pub mod dispatcher;
pub mod handler;
pub mod request;
pub mod static_files;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handler::{
    handler_fn, FnHandler, Handler, HandlerError, Reply, SessionHandler, SessionMessage,
};
pub use request::{Exchange, Request, Response};
pub use static_files::StaticFiles;
