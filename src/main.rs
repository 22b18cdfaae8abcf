use std::sync::Arc;

use anyhow::Context;
use soulmegle::{
    AppState, Config,
    connections::{ConnectionStore, SqliteConnections},
    reaper::Reaper,
    similarity::{PineconeIndex, SimilaritySearch},
    waiting::{MemoryWaiting, WaitingRegistry},
};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let store = SqliteConnections::new(db_pool, config.connection_ttl);
    store.migrate().await.context("creating connections table")?;
    let connections: Arc<dyn ConnectionStore> = Arc::new(store);

    let remote = config.remote_index()?;
    info!(url = %remote.url, "using remote vector index");
    let search: Arc<dyn SimilaritySearch> = Arc::new(PineconeIndex::new(remote)?);
    let waiting: Arc<dyn WaitingRegistry> = Arc::new(MemoryWaiting::new());

    Reaper {
        connections: connections.clone(),
        waiting: waiting.clone(),
        ttl: config.connection_ttl,
    }
    .spawn(config.reap_interval);

    let bind_addr = config.bind_addr;
    let app = soulmegle::app(AppState::new(config, connections, waiting, search))?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("signaling server running on http://{bind_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
