//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, trace span, timeout)
//!     → websocket.rs (upgrade for paths bound to a session handler)
//!     → request.rs (buffer body, convert to dispatch::Request)
//!     → [dispatch::Dispatcher resolves application and route]
//!     → response.rs (convert dispatch::Response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
