mod composition;
mod error;
mod handlers;
mod routes;
mod state;

use composition::{DiscardingMetadataSink, UnimplementedDicomParser};
use slicebox_core::config::AppConfig;
use slicebox_db::Db;
use slicebox_dicom::ValidationContexts;
use slicebox_storage::FsObjectStore;
use slicebox_transfer::{EventBus, Supervisor};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;

    let db = Db::connect(&config.database_url).await?;
    db.migrate().await?;

    let storage: Arc<dyn slicebox_storage::ObjectStore> = Arc::new(FsObjectStore::open(config.storage_dir.clone()).await?);
    let parser: Arc<dyn slicebox_dicom::DicomByteParser> = Arc::new(UnimplementedDicomParser);
    let metadata: Arc<dyn slicebox_transfer::MetadataSink> = Arc::new(DiscardingMetadataSink);
    let events = EventBus::new();
    let contexts = ValidationContexts::new(config.accepted_contexts.clone());

    let supervisor = Arc::new(Supervisor::new(
        db.clone(),
        storage.clone(),
        parser.clone(),
        slicebox_anon::AnonymizationService::new(db.clone()),
        events.clone(),
        Duration::from_millis(config.supervisor_tick_ms),
        config.box_online_timeout_ms,
    ));
    supervisor.start().await?;
    let tick_shutdown = supervisor.clone().spawn_tick_loop();

    let state = Arc::new(AppState::new(db, storage, parser, metadata, events, supervisor, contexts, &config));
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "slicebox-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = tick_shutdown.send(true);
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler; shutdown will rely on process kill");
    }
}
