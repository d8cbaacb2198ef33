//! storefront server
//!
//! Serves the checkout / payment / admin API and runs the outbox worker until
//! Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use storefront::{AppState, Config, api, logger};
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    logger::init_logger(&config.log_level, config.log_json, config.log_dir.as_deref());

    tracing::info!("Starting storefront (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    let shutdown = CancellationToken::new();

    // Outbox worker
    let worker = state.outbox_worker();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Periodic rate limiter cleanup (every 5 minutes)
    let rate_limiter = state.rate_limiter.clone();
    let cleanup_token = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = cleanup_token.cancelled() => break,
                _ = interval.tick() => rate_limiter.cleanup().await,
            }
        }
    });

    let app = api::create_router(state);
    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("storefront HTTP listening on {http_addr}");

    let server_token = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
            _ = server_token.cancelled() => {}
        }
    })
    .await?;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!("Outbox worker panicked: {e}");
    }
    tracing::info!("storefront stopped");
    Ok(())
}
