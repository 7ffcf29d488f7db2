//! Application runtime server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ dispatcher ──▶ registry lookup (atomic load)
//!                                        │                  │
//!                                        │                  ▼
//!                                        │           Application vN
//!                                        │           (filters, routes, static/)
//!                                        ▼
//!                              negotiation + handler
//!                                        │
//!     Client Response ◀──────────────────┘──▶ statistics (per-minute buckets)
//!
//!     Admin API / drop directory ──▶ deployment manager ──▶ registry swap
//! ```

use clap::Parser;
use std::path::PathBuf;

use app_runtime::config::{load_config, RuntimeConfig};
use app_runtime::deploy::HandlerCatalog;
use app_runtime::lifecycle::build_runtime;
use app_runtime::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "app-runtime", version, about = "Embeddable HTTP application runtime")]
struct Cli {
    /// Path to the TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "app-runtime starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        deploy_directory = %config.deploy.directory.display(),
        max_backups = config.deploy.max_backups,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let runtime = build_runtime(config, HandlerCatalog::with_builtins())?;
    runtime.serve().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
