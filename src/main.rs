mod config;
mod llm;
mod models;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::GeminiClient;
use crate::server::AppState;
use crate::store::{InteractionSink, InteractionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,replybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Application startup...");
    info!("  Model: {}", config.llm.model);
    info!(
        "  Store: database={}, collection={}",
        config.store.database, config.store.collection
    );

    let model = Arc::new(GeminiClient::new(&config.llm));
    if !model.is_available() {
        warn!("LLM service is not available. /reply requests will be rejected.");
    }

    let store = Arc::new(InteractionStore::connect(&config.store).await);
    if !store.is_connected() {
        warn!("Interaction store is not connected. Replies will not be saved.");
    }

    let app = server::router(AppState::new(model, store.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Server error")?;

    info!("Application shutdown...");
    store.disconnect().await;

    Ok(())
}
