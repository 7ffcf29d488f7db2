//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Hand WebSocket upgrades to the session bridge
//! - Convert every other request and pass it to the dispatcher
//! - Serve until the shutdown future resolves

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    extract::ws::WebSocketUpgrade,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RuntimeConfig;
use crate::dispatch::Dispatcher;
use crate::http::request::{
    into_dispatch_request, is_websocket_upgrade, propagate_request_id_layer, request_id,
    set_request_id_layer,
};
use crate::http::response::into_http_response;
use crate::http::websocket::{self, SessionContext};
use crate::statistics::{HttpOutcome, WebSocketStatistics};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub ws_stats: Arc<WebSocketStatistics>,
    pub max_body_bytes: usize,
}

/// HTTP listener serving the deployed applications.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &RuntimeConfig, state: AppState) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RuntimeConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(runtime_handler))
            .route("/{*path}", any(runtime_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Router for in-process use, e.g. `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain open requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: WebSocket upgrade or dispatch.
async fn runtime_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();
    let request_id = request_id(&parts);

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Dispatching request"
    );

    if is_websocket_upgrade(&parts.headers) {
        let session = state
            .dispatcher
            .registry()
            .lookup(parts.uri.path())
            .and_then(|(application, path)| {
                let handler = Arc::clone(application.socket(&path)?);
                Some((application.shared_name(), path, handler))
            });
        if let Some((application, path, handler)) = session {
            return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
                Ok(upgrade) => websocket::upgrade(
                    upgrade,
                    SessionContext {
                        application,
                        path,
                        handler,
                        stats: Arc::clone(&state.ws_stats),
                    },
                ),
                Err(rejection) => rejection.into_response(),
            };
        }
    }

    let request = match into_dispatch_request(parts, body, state.max_body_bytes).await {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body rejected");
            let status = e.status();
            let body = status.canonical_reason().unwrap_or("Bad Request");
            state.dispatcher.http_stats().record(HttpOutcome {
                status: status.as_u16(),
                duration: start.elapsed(),
                response_bytes: body.len() as u64,
            });
            return (status, body).into_response();
        }
    };

    into_http_response(state.dispatcher.dispatch(request).await)
}
