use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::ServerConfig;
use server::db;
use server::http_server::{run_http_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if exists
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    db::run_migrations(&config.db).await?;
    let db_pool = db::connect(&config.db, config.db_max_connections).await?;

    let state = AppState::new(db_pool, &config.jwt_secret);

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal. Shutting down gracefully...");
        }
        shutdown.cancel();
    });

    info!("Server started. Waiting for shutdown signal (Ctrl+C)...");
    run_http_server(&config.http_addr, state, cancellation_token).await?;

    info!("Server shut down successfully");
    Ok(())
}
