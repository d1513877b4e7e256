use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use calendrun_common::AppConfig;
use calendrun_projector::{DispatchRegistry, EventSource, ProjectionEngine};
use calendrun_readmodel::ReadModel;
use flowcore_client::FlowcoreClient;
use tracing_subscriber::EnvFilter;

use calendrun_server::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calendrun=info".parse()?))
        .init();

    tracing::info!("Starting calendrun-server");

    let config = AppConfig::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    let read_model = ReadModel::new(pool);
    if config.reset_db {
        read_model.reset().await.context("Failed to reset read model")?;
    }
    read_model.migrate().await.context("Failed to bootstrap schema")?;

    // ─── Event source ────────────────────────────────────────────────────────

    let client = FlowcoreClient::new(config.flowcore());
    let data_core_id = client
        .data_core_id()
        .await
        .context("Failed to resolve data core")?;
    tracing::info!(
        tenant = client.tenant(),
        data_core = client.data_core_name(),
        data_core_id = %data_core_id,
        "Event source ready"
    );
    let source: Arc<dyn EventSource> = Arc::new(client);

    // ─── Projection engine ───────────────────────────────────────────────────

    let registry = Arc::new(DispatchRegistry::calendrun(read_model.clone()));
    tracing::info!(pairs = registry.len(), "Projection handlers registered");

    let mut engine = ProjectionEngine::new(source, registry, config.page_size);

    if config.process_backlog_on_startup {
        match engine.catch_up_backlog(config.backlog_time_buckets).await {
            Ok(buckets) => tracing::info!(buckets, "Backlog catch-up complete"),
            Err(e) => tracing::warn!(error = %e, "Backlog catch-up failed, continuing with live polling"),
        }
    }

    tokio::spawn(engine.run(Duration::from_secs(config.poll_interval_secs)));

    // ─── Read API ────────────────────────────────────────────────────────────

    let state = AppState::new(read_model, config.backend_api_key.as_deref());
    let app = routes::build_router(state, config.cors_origin.as_deref());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Read API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
