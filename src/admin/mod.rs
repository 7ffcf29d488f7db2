//! Admin API subsystem.
//!
//! # Data Flow
//! ```text
//! Admin listener (separate bind address)
//!     → auth.rs (Bearer token check)
//!     → handlers.rs
//!         → DeploymentManager (blocking pool)
//!         → HttpStatistics / WebSocketStatistics (get_entries)
//! ```
//!
//! # Design Decisions
//! - Never exposed on the application listener
//! - Deployment errors map onto HTTP status codes in one place

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::deploy::DeploymentManager;
use crate::statistics::{HttpStatistics, WebSocketStatistics};

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub manager: Arc<DeploymentManager>,
    pub http_stats: Arc<HttpStatistics>,
    pub ws_stats: Arc<WebSocketStatistics>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/applications", get(get_applications))
        .route(
            "/admin/applications/{name}",
            post(create_application).delete(delete_application),
        )
        .route("/admin/applications/{name}/backups", get(get_backups))
        .route("/admin/applications/{name}/publish", post(publish))
        .route("/admin/applications/{name}/rollback", post(rollback))
        .route("/admin/applications/{name}/unpublish", post(unpublish))
        .route("/admin/stats/http", get(get_http_stats))
        .route("/admin/stats/websocket", get(get_websocket_stats))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
