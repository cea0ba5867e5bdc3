//! # Mediaflow Server
//!
//! Runs the job processor behind an HTTP API:
//!
//! - **Job API**: submit, query, cancel, restart, fail and delete jobs
//! - **Backend callbacks**: services post assignment updates per execution
//! - **Worker endpoint**: executes operations handed over by remote invokers
//! - **Retention**: a background sweep deletes finished jobs past their age

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use mediaflow_server::{
    infra::{
        bootstrap::build_state,
        config::{Config, ConfigLoad, ConfigLoader},
    },
    routes,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mediaflow-server")]
#[command(about = "Job processor for media workflows")]
struct Cli {
    /// Path to a mediaflow.toml configuration file
    #[arg(short, long, env = "MEDIAFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli)?;
    run_server(config).await
}

fn load_runtime_config(cli: &Cli) -> anyhow::Result<Arc<Config>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let cleanup = &config.processor.cleanup;
    let mutex = &config.processor.mutex;
    info!(
        public_url = %config.public_url,
        cleanup.retention_days = cleanup.retention_days,
        cleanup.interval_secs = cleanup.interval_secs,
        mutex.lease_ms = mutex.lease_ms,
        mutex.acquire_timeout_ms = mutex.acquire_timeout_ms,
        "processor configuration in effect"
    );

    Ok(Arc::new(config))
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config)).await?;
    let shutdown = CancellationToken::new();

    let cleanup = tokio::spawn(state.cleanup_scheduler().run(shutdown.child_token()));

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    config.server.host, config.server.port
                )
            })?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("Starting Mediaflow server on {addr}");

    let router = routes::create_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(err) = cleanup.await {
        warn!(error = %err, "cleanup scheduler task ended abnormally");
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }
    info!("shutdown requested");
    token.cancel();
}
