use std::sync::Arc;

use gig_dispatch::api;
use gig_dispatch::config::{Config, LogFormat};
use gig_dispatch::engine::dispatch::run_dispatcher;
use gig_dispatch::engine::sweeper::run_sweeper;
use gig_dispatch::error::AppError;
use gig_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let (app_state, dispatch_rx) = AppState::builder()
        .dispatch_queue_size(config.dispatch_queue_size)
        .event_buffer_size(config.event_buffer_size)
        .settings(config.dispatch.clone())
        .build()?;
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_dispatcher(shared_state.clone(), dispatch_rx));
    tokio::spawn(run_sweeper(shared_state.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        offer_ttl_secs = config.dispatch.offer_ttl.as_secs(),
        search_radius_km = config.dispatch.search_radius_km,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
