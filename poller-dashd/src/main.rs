mod api;
mod config;
mod view;
mod view_manager;

use std::sync::Arc;
use anyhow::{Context, Result};
use poller_client::{EngineHandle, HttpRegistryClient, SubscriberHandle, WsConnector};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("poller_dashd=info,poller_client=info")
            }),
        )
        .init();

    tracing::info!("Starting poller-dashd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/service-poller/dashd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Registry client and sync engine
    let registry_url = config.registry_url()?;
    let registry = HttpRegistryClient::new(&registry_url, config.registry_timeout())
        .context("Failed to create registry client")?;
    let engine = EngineHandle::spawn(Arc::new(registry), config.engine_config());
    tracing::info!("Using registry at {}", registry_url);

    // Startup listing; the push channel resyncs again once it opens
    if let Err(e) = engine.initialize().await {
        tracing::warn!("Initial registry fetch failed, waiting for push channel: {}", e);
    }

    // Create hash watch channel
    let initial_hash = view::hash::compute_hash(&engine.snapshot());
    tracing::info!("Initial snapshot hash: {}", initial_hash);
    let (hash_tx, hash_rx) = watch::channel(initial_hash);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn view manager task
    let view_cancel = cancel.clone();
    let view_snapshots = engine.subscribe();
    let view_handle = tokio::spawn(async move {
        if let Err(e) = view_manager::run(view_snapshots, hash_tx, view_cancel).await {
            tracing::error!("View manager error: {}", e);
        }
    });

    // Subscribe to status pushes
    let push_url = config.push_url()?;
    tracing::info!("Subscribing to {} on {}", config.push.address, push_url);
    let subscriber = SubscriberHandle::spawn(
        Arc::new(WsConnector::new(push_url)),
        Arc::new(engine.clone()),
        config.subscriber_config(),
    );

    // Build API router
    let app_state = api::routes::AppState {
        engine: engine.clone(),
        hash_rx,
        push_state: subscriber.watch_state(),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // No status event is delivered once this returns
    subscriber.shutdown().await;

    // Wait for the remaining tasks to complete
    let _ = tokio::join!(view_handle, server_handle);

    if let Err(e) = engine.shutdown().await {
        tracing::error!("Failed to shutdown sync engine: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
