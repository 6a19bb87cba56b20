//! POLL-mode surface (spec.md §4.E, §6): pure functions the HTTP layer
//! wires to `GET /outgoing/poll`, `GET /outgoing`, `POST /outgoing/done`,
//! `POST /outgoing/failed`. Authentication (`pollBoxByToken`) is the
//! caller's job; these take an already-authenticated `BoxId`.

use crate::outgoing::dto::OutgoingTransactionImage;
use crate::outgoing::pipeline::anonymised_bytes_for_outgoing_image;
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::{BoxId, OutgoingImageId, OutgoingTransactionId};
use slicebox_core::model::TransactionStatus;
use slicebox_core::Result;
use slicebox_db::Db;
use slicebox_dicom::{DicomByteParser, PipelineOutput};
use slicebox_storage::ObjectStore;
use std::sync::Arc;

/// `GET /outgoing/poll`: next work item for this (already-authenticated)
/// box, or `None` for the caller to answer with 204.
pub async fn poll_next(db: &Db, box_id: BoxId) -> Result<Option<OutgoingTransactionImage>> {
    db.touch_poll(box_id, slicebox_core::time::EpochMillis::now().0).await?;
    let next = db.next_outgoing_transaction_image_for_box_id(box_id).await?;
    Ok(next.map(|(transaction, image)| OutgoingTransactionImage {
        transaction_id: transaction.id,
        image_id: image.image_id,
        sequence_number: image.sequence_number,
        total_image_count: transaction.total_image_count,
    }))
}

/// `GET /outgoing?transactionid&imageid`: anonymised bytes for one work
/// item, resolved by its outgoing-image row.
pub async fn bytes_for(
    db: &Db,
    storage: &Arc<dyn ObjectStore>,
    parser: &Arc<dyn DicomByteParser>,
    anon: &AnonymizationService,
    transaction_id: OutgoingTransactionId,
    image_id: OutgoingImageId,
) -> Result<PipelineOutput> {
    let images = db.outgoing_images_by_transaction_id(transaction_id).await?;
    let image = images
        .into_iter()
        .find(|i| i.id == image_id)
        .ok_or_else(|| slicebox_core::SliceboxError::not_found("no such image on this transaction"))?;
    anonymised_bytes_for_outgoing_image(db, storage, parser, anon, image.id, &image.image_id).await
}

/// `POST /outgoing/done`: ack delivery, same bookkeeping as PUSH's 2xx path.
pub async fn mark_done(
    db: &Db,
    transaction_id: OutgoingTransactionId,
    image_id: OutgoingImageId,
) -> Result<()> {
    db.update_outgoing_transaction(transaction_id, image_id).await?;
    Ok(())
}

/// `POST /outgoing/failed`: mark the transaction FAILED.
pub async fn mark_failed(db: &Db, transaction_id: OutgoingTransactionId) -> Result<()> {
    db.set_outgoing_transaction_status(transaction_id, TransactionStatus::Failed).await
}
