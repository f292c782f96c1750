//! tutorgate HTTP server
//!
//! Starts an Axum web server that answers tutor questions on the fast or
//! thorough model tier under per-user monthly quotas.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tutorgate::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    context_cache::{MemoryContextStore, spawn_sweeper},
    handlers::{self, AppState},
    ledger::MemoryUsageStore,
    models::AnthropicGateway,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let config = Arc::new(Config::from_file(&cli.config)?);

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting tutorgate server on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        fast_model = %config.models.fast.model(),
        thorough_model = %config.models.thorough.model(),
        simple_limit = config.quota.simple_limit,
        complex_limit = config.quota.complex_limit,
        total_limit = config.quota.total_limit,
        "Tiers and quota configured"
    );

    let gateway = Arc::new(AnthropicGateway::from_config(&config)?);
    let usage_store = Arc::new(MemoryUsageStore::new());
    let contexts = Arc::new(MemoryContextStore::new(Duration::from_secs(
        config.context_cache.ttl_seconds,
    )));
    let sweeper = spawn_sweeper(
        &contexts,
        Duration::from_secs(config.context_cache.sweep_interval_seconds),
    );

    let state = AppState::new(Arc::clone(&config), gateway, usage_store, contexts)?;
    let app = handlers::build_router(state);

    // Create socket address
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("tutorgate shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
