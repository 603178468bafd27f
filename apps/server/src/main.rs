//! RDR server - web server entry point
//!
//! Operator tasks (reference-data import, backfill, migrations) live in `rdr-cli`.

use anyhow::Context;
use rdr::{api::create_router, config::Config, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _telemetry_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging/telemetry")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.logging.deployment_environment,
        "Starting RDR server"
    );

    let addr = config
        .socket_addr()
        .context("Failed to determine socket address")?;

    tracing::info!(
        backend = ?config.database.backend,
        listen_addr = %addr,
        "Configuration loaded"
    );

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;
    let app = create_router(state);

    tracing::info!("RDR server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API endpoint: http://{}{}", addr, rdr::api::API_PREFIX);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server terminated unexpectedly");
        logging::shutdown_telemetry();
        return Err(e.into());
    }

    tracing::info!("Server shutdown complete");
    logging::shutdown_telemetry();

    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = tokio::signal::ctrl_c();
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler; waiting for SIGINT only");
            let _ = sigint.await;
            return;
        }
    };

    tokio::select! {
        _ = sigint => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for CTRL+C");
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
