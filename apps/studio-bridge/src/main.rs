use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use studio_bridge::{
    routes, telemetry, AppState, BridgeConfig, Cli, JobBroker, LivenessTracker, McpServer,
};
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Client records are forgotten after this many silent liveness windows.
const PRUNE_AFTER_WINDOWS: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::try_from(cli)?;
    telemetry::init_tracing(config.quiet);
    info!(
        listen_addr = %config.listen_addr,
        poll_timeout_secs = config.poll_timeout.as_secs(),
        job_timeout_secs = config.job_timeout.as_secs(),
        client_id = %config.client_id,
        http_only = config.http_only,
        "starting studio-bridge"
    );

    run(config).await
}

async fn run(config: BridgeConfig) -> Result<()> {
    let liveness = Arc::new(LivenessTracker::new(config.liveness_window));
    let broker = Arc::new(JobBroker::new(
        Arc::clone(&liveness),
        config.broker_settings(),
    ));
    let state = AppState::new(broker, &config.client_id, config.poll_timeout);
    let reaper = liveness.spawn_reaper(
        config.liveness_window,
        config.liveness_window * PRUNE_AFTER_WINDOWS,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("HTTP server listening on {}", config.listen_addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let app = routes::router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    if config.http_only {
        shutdown_signal().await;
        info!("shutdown signal received");
    } else {
        let mcp = McpServer::new(state);
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            served = mcp.serve(stdin, tokio::io::stdout()) => match served {
                Ok(()) => info!("MCP client disconnected"),
                Err(err) => warn!(error = %err, "MCP stream failed"),
            },
            _ = shutdown_signal() => info!("shutdown signal received"),
        }
    }

    let _ = shutdown_tx.send(true);
    server
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server shutdown with error")?;
    reaper.abort();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
