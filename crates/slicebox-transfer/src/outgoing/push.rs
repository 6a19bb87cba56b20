//! PUSH-mode worker (spec.md §4.E): one per remote box, polls its own
//! outgoing queue and posts bytes to the peer. Shutdown follows the
//! teacher's watch-channel idiom (`LanDiscoveryService`'s `shutdown_tx`/
//! `shutdown_rx` pair) rather than aborting the task from outside.

use crate::outgoing::pipeline::anonymised_bytes_for_outgoing_image;
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::BoxId;
use slicebox_core::model::TransactionStatus;
use slicebox_db::Db;
use slicebox_dicom::DicomByteParser;
use slicebox_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const IDLE_INTERVAL: Duration = Duration::from_millis(500);
const NETWORK_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct OutgoingWorker {
    box_id: BoxId,
    db: Db,
    storage: Arc<dyn ObjectStore>,
    parser: Arc<dyn DicomByteParser>,
    anon: AnonymizationService,
    http: reqwest::Client,
}

impl OutgoingWorker {
    pub fn new(
        box_id: BoxId,
        db: Db,
        storage: Arc<dyn ObjectStore>,
        parser: Arc<dyn DicomByteParser>,
        anon: AnonymizationService,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("static reqwest client configuration is always valid");
        Self { box_id, db, storage, parser, anon, http }
    }

    /// Spawn the worker's loop, returning a shutdown handle the supervisor
    /// holds and signals on box delete or process shutdown.
    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(self.run(shutdown_rx));
        shutdown_tx
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                outcome = self.step() => {
                    match outcome {
                        Ok(true) => {}
                        Ok(false) => tokio::time::sleep(IDLE_INTERVAL).await,
                        Err(err) => {
                            tracing::warn!(box_id = %self.box_id, error = %err, "outgoing push attempt failed");
                            tokio::time::sleep(NETWORK_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    /// One push attempt. Returns `Ok(true)` if an image was sent (caller
    /// should immediately look for more), `Ok(false)` if the queue is idle.
    async fn step(&mut self) -> slicebox_core::Result<bool> {
        let box_ = match self.db.box_by_id(self.box_id).await? {
            Some(b) => b,
            None => return Ok(false),
        };

        let Some((transaction, image)) =
            self.db.next_outgoing_transaction_image_for_box_id(self.box_id).await?
        else {
            return Ok(false);
        };

        let output = anonymised_bytes_for_outgoing_image(
            &self.db,
            &self.storage,
            &self.parser,
            &self.anon,
            image.id,
            &image.image_id,
        )
        .await;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                // A pipeline failure against our own stored bytes is an
                // internal defect, not a remote rejection; treat it like
                // the network-error path so the transaction gets retried
                // rather than permanently failed.
                self.db.set_box_online(self.box_id, false).await.ok();
                return Err(err);
            }
        };

        let url = format!(
            "{}/incoming?transactionid={}&sequencenumber={}&totalimagecount={}",
            box_.base_url.trim_end_matches('/'),
            transaction.id.uuid(),
            image.sequence_number,
            transaction.total_image_count,
        );

        let response = self
            .http
            .post(&url)
            .query(&[("token", box_.token.as_str())])
            .body(output.storage_bytes)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.db.update_outgoing_transaction(transaction.id, image.id).await?;
                self.db.set_box_online(self.box_id, true).await?;
                Ok(true)
            }
            Ok(resp) if resp.status().is_client_error() => {
                self.db
                    .set_outgoing_transaction_status(transaction.id, TransactionStatus::Failed)
                    .await?;
                self.db.set_box_online(self.box_id, true).await?;
                Ok(true)
            }
            Ok(resp) => {
                tracing::warn!(box_id = %self.box_id, status = %resp.status(), "unexpected response, treating as transient");
                self.db
                    .set_outgoing_transaction_status(transaction.id, TransactionStatus::Waiting)
                    .await?;
                self.db.set_box_online(self.box_id, false).await?;
                Ok(true)
            }
            Err(err) => {
                self.db
                    .set_outgoing_transaction_status(transaction.id, TransactionStatus::Waiting)
                    .await?;
                self.db.set_box_online(self.box_id, false).await?;
                Err(slicebox_core::SliceboxError::transient(format!("push to {url} failed: {err}")))
            }
        }
    }
}
