#![forbid(unsafe_code)]

//! HTTP server for the reeltube video feed.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use reeltube::{
    api::{self, AppState},
    catalog::CatalogStore,
    config::{self, DEFAULT_CONFIG_PATH, EnvConfig, LogFormat},
    logging,
    snapshot::SnapshotTask,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the reeltube video feed API.")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env-style config file")]
    config: PathBuf,
    #[arg(long = "host", value_name = "ADDR", help = "Interface to bind (default 0.0.0.0)")]
    host: Option<String>,
    #[arg(long = "port", value_name = "PORT", help = "Port to listen on (default 5000)")]
    port: Option<u16>,
    #[arg(
        long = "snapshot-path",
        value_name = "PATH",
        help = "Where the catalog snapshot is written (default videos-data.json)"
    )]
    snapshot_path: Option<PathBuf>,
    #[arg(
        long = "snapshot-interval",
        value_name = "SECS",
        help = "Seconds between catalog snapshots (default 3600)"
    )]
    snapshot_interval: Option<u64>,
    #[arg(long = "no-snapshot", help = "Disable catalog snapshots entirely")]
    no_snapshot: bool,
    #[arg(long = "log-format", value_name = "FORMAT", help = "pretty or json")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn overrides(&self) -> EnvConfig {
        EnvConfig {
            host: self.host.clone(),
            port: self.port,
            snapshot_path: self.snapshot_path.clone(),
            snapshot_interval_secs: self.snapshot_interval,
            snapshot_enabled: self.no_snapshot.then_some(false),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = config::load_runtime_config(&cli.config, cli.overrides())
        .context("loading configuration")?;
    logging::init(runtime.log_format)?;

    let catalog = Arc::new(CatalogStore::seeded()?);
    info!(videos = catalog.len(), "catalog seeded");

    let snapshot = match runtime.snapshot.clone() {
        Some(settings) => Some(SnapshotTask::spawn(Arc::clone(&catalog), settings)),
        None => {
            info!("catalog snapshots disabled");
            None
        }
    };

    let served = serve(&runtime.host, runtime.port, AppState::new(catalog)).await;

    // Flush even when the server failed.
    if let Some(task) = snapshot {
        task.shutdown().await;
    }

    served
}

async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr = SocketAddr::new(
        host.parse()
            .with_context(|| format!("parsing bind address {host}"))?,
        port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
