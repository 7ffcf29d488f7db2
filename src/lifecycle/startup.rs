//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize all subsystems in dependency order
//! - Recover deployed applications before any listener starts
//! - Start background tasks (retention sweeper, drop watcher, metrics)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: configuration and I/O errors at startup are fatal
//! - A single application failing to recover is logged, not fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, RuntimeConfig};
use crate::deploy::{
    DeploymentError, DeploymentManager, DropWatcher, HandlerCatalog, ManifestLoader, Registry,
    TarExtractor,
};
use crate::dispatch::Dispatcher;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::negotiation::Negotiator;
use crate::observability::metrics;
use crate::statistics::{spawn_retention_sweeper, HttpStatistics, WebSocketStatistics};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("recovery failed: {0}")]
    Recovery(#[from] DeploymentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("drop directory watcher failed: {0}")]
    Watcher(#[from] notify::Error),
}

/// All wired subsystems, ready to serve.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub registry: Arc<Registry>,
    pub manager: Arc<DeploymentManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub http_stats: Arc<HttpStatistics>,
    pub ws_stats: Arc<WebSocketStatistics>,
    pub shutdown: Shutdown,
    started_at: Instant,
}

/// Wire every subsystem and republish what is already deployed.
pub fn build_runtime(
    config: RuntimeConfig,
    catalog: HandlerCatalog,
) -> Result<Runtime, StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    let retention = Duration::from_secs(config.statistics.retention_hours * 3600);
    let http_stats = Arc::new(HttpStatistics::new(retention));
    let ws_stats = Arc::new(WebSocketStatistics::new(retention));

    let registry = Arc::new(Registry::new(config.deploy.default_application.clone()));
    let manager = Arc::new(DeploymentManager::new(
        Arc::clone(&registry),
        Arc::new(ManifestLoader::new(Arc::new(catalog))),
        Arc::new(TarExtractor),
        config.deploy.clone(),
    ));

    manager.recover()?;

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(Negotiator::with_defaults()),
        Arc::clone(&http_stats),
    ));

    Ok(Runtime {
        config,
        registry,
        manager,
        dispatcher,
        http_stats,
        ws_stats,
        shutdown: Shutdown::new(),
        started_at: Instant::now(),
    })
}

impl Runtime {
    pub fn http_server(&self) -> HttpServer {
        HttpServer::new(
            &self.config,
            AppState {
                dispatcher: Arc::clone(&self.dispatcher),
                ws_stats: Arc::clone(&self.ws_stats),
                max_body_bytes: self.config.listener.max_body_bytes,
            },
        )
    }

    pub fn admin_router(&self) -> axum::Router {
        setup_admin_router(AdminState {
            manager: Arc::clone(&self.manager),
            http_stats: Arc::clone(&self.http_stats),
            ws_stats: Arc::clone(&self.ws_stats),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
            started_at: self.started_at,
        })
    }

    /// Start background tasks and listeners; returns after a graceful
    /// shutdown triggered by a signal.
    pub async fn serve(self) -> Result<(), StartupError> {
        let observability = &self.config.observability;
        if observability.metrics_enabled {
            match observability.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => {
                    if let Err(e) = metrics::init_metrics(addr) {
                        tracing::error!(error = %e, "Failed to start metrics exporter");
                    }
                }
                Err(e) => tracing::error!(
                    metrics_address = %observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                ),
            }
        }

        let sweeper = spawn_retention_sweeper(
            Arc::clone(&self.http_stats),
            Arc::clone(&self.ws_stats),
            Duration::from_secs(self.config.statistics.sweep_interval_secs),
            self.shutdown.subscribe(),
        );

        let _watcher = match &self.config.deploy.drop_directory {
            Some(dir) => {
                let watcher = DropWatcher::new(dir, Arc::clone(&self.manager));
                let published = watcher.scan()?;
                if !published.is_empty() {
                    tracing::info!(applications = ?published, "Published dropped archives");
                }
                Some(watcher.run()?)
            }
            None => None,
        };

        let admin = if self.config.admin.enabled {
            let listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Admin API listening");
            let router = self.admin_router();
            let stop = self.shutdown.triggered();
            Some(tokio::spawn(async move {
                axum::serve(listener, router).with_graceful_shutdown(stop).await
            }))
        } else {
            None
        };

        let listener = TcpListener::bind(&self.config.listener.bind_address).await?;
        let shutdown = self.shutdown.clone();
        self.http_server()
            .run(listener, async move {
                signals::shutdown_signal().await;
                shutdown.trigger();
            })
            .await?;

        // The HTTP server can also stop on a listener error; stop the rest too.
        self.shutdown.trigger();
        if let Some(admin) = admin {
            match admin.await {
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
                Err(e) => tracing::error!(error = %e, "Admin API task failed"),
                Ok(Ok(())) => {}
            }
        }
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "Statistics sweeper task failed");
        }
        Ok(())
    }
}
