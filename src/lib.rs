//! Embeddable HTTP application runtime.
//!
//! Named applications are deployed, replaced, rolled back and removed while
//! the server keeps serving; each request runs against the version that was
//! live when it arrived.

// Core subsystems
pub mod config;
pub mod deploy;
pub mod dispatch;
pub mod http;
pub mod negotiation;
pub mod routing;
pub mod statistics;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::RuntimeConfig;
pub use deploy::{Application, DeploymentError, DeploymentManager, HandlerCatalog, Registry};
pub use dispatch::{Dispatcher, Exchange, Handler, Reply, Request, Response};
pub use http::HttpServer;
pub use lifecycle::{build_runtime, Runtime, Shutdown};
