//! Supervisor / scheduler (spec.md §4.G): one outgoing worker per known
//! PUSH box, spawned at startup and on box insert; stopped on box delete.
//! Periodically refreshes box online status and demotes stalled
//! transactions via `Db::update_status_for_boxes_and_transactions`.

use crate::events::{DomainEvent, EventBus};
use crate::outgoing::OutgoingWorker;
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::BoxId;
use slicebox_core::model::SendMethod;
use slicebox_core::time::EpochMillis;
use slicebox_core::Result;
use slicebox_db::Db;
use slicebox_dicom::DicomByteParser;
use slicebox_storage::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

pub struct Supervisor {
    db: Db,
    storage: Arc<dyn ObjectStore>,
    parser: Arc<dyn DicomByteParser>,
    anon: AnonymizationService,
    events: EventBus,
    tick_interval: Duration,
    poll_timeout_ms: i64,
    workers: RwLock<HashMap<BoxId, watch::Sender<bool>>>,
}

impl Supervisor {
    pub fn new(
        db: Db,
        storage: Arc<dyn ObjectStore>,
        parser: Arc<dyn DicomByteParser>,
        anon: AnonymizationService,
        events: EventBus,
        tick_interval: Duration,
        poll_timeout_ms: i64,
    ) -> Self {
        Self { db, storage, parser, anon, events, tick_interval, poll_timeout_ms, workers: RwLock::new(HashMap::new()) }
    }

    /// Read all known boxes and spawn a worker for every PUSH box
    /// (spec.md §4.G "at startup: read all boxes; for each, spawn the
    /// appropriate worker").
    pub async fn start(&self) -> Result<()> {
        for box_ in self.db.list_boxes().await? {
            if box_.send_method == SendMethod::Push {
                self.spawn_worker(box_.id).await;
            }
        }
        Ok(())
    }

    async fn spawn_worker(&self, box_id: BoxId) {
        let worker = OutgoingWorker::new(
            box_id,
            self.db.clone(),
            self.storage.clone(),
            self.parser.clone(),
            self.anon.clone(),
        );
        let shutdown = worker.spawn();
        self.workers.write().await.insert(box_id, shutdown);
    }

    /// Called after a new box is inserted; spawns its worker if it is PUSH.
    pub async fn on_box_inserted(&self, box_id: BoxId, send_method: SendMethod) {
        if send_method == SendMethod::Push {
            self.spawn_worker(box_id).await;
        }
    }

    /// Stops the box's worker (if any), deletes it (cascading its
    /// transactions per spec.md §3), and publishes `SourceDeleted`.
    pub async fn on_box_deleted(&self, box_id: BoxId) -> Result<()> {
        if let Some(shutdown) = self.workers.write().await.remove(&box_id) {
            let _ = shutdown.send(true);
        }
        self.db.remove_box(box_id).await?;
        self.events.publish(DomainEvent::SourceDeleted(box_id.to_string()));
        Ok(())
    }

    /// Spawn the periodic tick (default 5s, spec.md §4.G); returns a
    /// shutdown handle for process teardown.
    pub fn spawn_tick_loop(self: Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(self.tick_interval) => {
                        if let Err(err) = self
                            .db
                            .update_status_for_boxes_and_transactions(EpochMillis::now(), self.poll_timeout_ms)
                            .await
                        {
                            tracing::warn!(error = %err, "supervisor tick failed");
                        }
                    }
                }
            }
        });
        shutdown_tx
    }
}
