use slicebox_anon::AnonymizationService;
use slicebox_core::config::AppConfig;
use slicebox_db::Db;
use slicebox_dicom::{DicomByteParser, ValidationContexts};
use slicebox_storage::ObjectStore;
use slicebox_transfer::{EventBus, MetadataSink, Supervisor};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub db: Db,
    pub storage: Arc<dyn ObjectStore>,
    pub parser: Arc<dyn DicomByteParser>,
    pub anon: AnonymizationService,
    pub metadata: Arc<dyn MetadataSink>,
    pub events: EventBus,
    pub supervisor: Arc<Supervisor>,
    pub contexts: ValidationContexts,
    pub temp_cleanup_delay: Duration,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Db,
        storage: Arc<dyn ObjectStore>,
        parser: Arc<dyn DicomByteParser>,
        metadata: Arc<dyn MetadataSink>,
        events: EventBus,
        supervisor: Arc<Supervisor>,
        contexts: ValidationContexts,
        config: &AppConfig,
    ) -> Self {
        let anon = AnonymizationService::new(db.clone());
        Self {
            db,
            storage,
            parser,
            anon,
            metadata,
            events,
            supervisor,
            contexts,
            temp_cleanup_delay: Duration::from_millis(config.temp_cleanup_delay_ms),
        }
    }
}
