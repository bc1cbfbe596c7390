//! Push CI Server — push-triggered syntax check and test runs.
//!
//! A standalone binary that receives GitHub push webhooks, builds the pushed
//! commit, reports a commit status and serves the build history.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;

use push_ci::config::CiConfig;
use push_ci::routes::{self, CiRouterState};
use push_ci::services::history::HistoryStore;
use push_ci::services::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "push-ci", about = "Push-triggered CI server")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "CI_PORT", default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "CI_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, env = "CI_METRICS_PORT", default_value = "9000")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Push CI Server...");

    // Configuration errors (missing token) stop the server here.
    let config = CiConfig::from_env()?;
    tracing::info!(
        workspace = %config.workspace_dir.display(),
        history = %config.history_path.display(),
        test_command = %config.test_command,
        test_timeout_secs = config.test_timeout.as_secs(),
        excluded_dirs = ?config.excluded_dirs,
        "Configuration loaded"
    );

    let history = HistoryStore::open(&config.history_path)?;
    let pipeline = Arc::new(Pipeline::from_config(&config, history));
    let state = CiRouterState::new(pipeline);
    let builds = state.builds.clone();
    let app = routes::ci_router(state);

    // Initialize metrics
    push_ci::metrics::init_metrics(SocketAddr::new(cli.bind, cli.metrics_port));

    // Start server
    let addr = SocketAddr::new(cli.bind, cli.port);
    tracing::info!("Push CI Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Started builds run to completion so their status and record are final.
    builds.close();
    if !builds.is_empty() {
        tracing::info!(running = builds.len(), "Waiting for in-flight builds");
    }
    builds.wait().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
