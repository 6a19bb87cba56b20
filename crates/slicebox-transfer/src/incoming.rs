//! Incoming transfer engine (spec.md §4.F): `POST /incoming` handling,
//! reverse-anonymising and forking to storage plus the metadata service.

use crate::events::{DomainEvent, EventBus};
use crate::metadata::MetadataSink;
use bytes::Bytes;
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::OutgoingTransactionId;
use slicebox_core::model::IncomingTransaction;
use slicebox_core::{Result, SliceboxError};
use slicebox_db::Db;
use slicebox_dicom::{run_incoming_pipeline, DicomByteParser, ValidationContexts};
use slicebox_storage::{schedule_cleanup, temp_key, ObjectSink, ObjectStore};
use std::sync::Arc;
use std::time::Duration;

/// `POST /incoming?transactionid&sequencenumber&totalimagecount`
/// (spec.md §4.F). `token` is the peer's shared bearer token; the caller
/// has already separated it from the raw request.
#[allow(clippy::too_many_arguments)]
pub async fn handle_incoming(
    db: &Db,
    storage: &Arc<dyn ObjectStore>,
    parser: &Arc<dyn DicomByteParser>,
    anon: &AnonymizationService,
    metadata: &Arc<dyn MetadataSink>,
    events: &EventBus,
    contexts: &ValidationContexts,
    temp_cleanup_delay: Duration,
    token: &str,
    transaction_id: OutgoingTransactionId,
    sequence_number: i32,
    total_image_count: i32,
    bytes: Bytes,
) -> Result<IncomingTransaction> {
    let box_ = db
        .box_by_token(token)
        .await?
        .ok_or_else(|| SliceboxError::unauthorized("unknown box token"))?;

    let tmp_key = temp_key();
    let parts = parser.parse(bytes);

    let output = match run_incoming_pipeline(parts, contexts, anon).await {
        Ok(output) => output,
        Err(err) => {
            // Nothing was written under our buffered-pipeline design, but
            // scheduling cleanup anyway keeps this step present regardless
            // of how the pipeline is implemented underneath.
            schedule_cleanup(storage.clone(), tmp_key, temp_cleanup_delay);
            return Err(err);
        }
    };

    let mut sink: Box<dyn ObjectSink> = storage.file_sink(&tmp_key).await?;
    sink.write_chunk(Bytes::from(output.storage_bytes)).await?;
    sink.finish().await?;

    let image_id = match metadata.add_metadata(output.metadata.clone()).await {
        Ok(image_id) => image_id,
        Err(err) => {
            schedule_cleanup(storage.clone(), tmp_key, temp_cleanup_delay);
            return Err(err);
        }
    };

    let result = db
        .update_incoming(box_.id, transaction_id, sequence_number, total_image_count, &image_id)
        .await?;

    storage.move_object(&tmp_key, &storage.image_name(&image_id)).await?;
    events.publish(DomainEvent::MetaDataAdded(output.metadata));

    Ok(result.transaction)
}
