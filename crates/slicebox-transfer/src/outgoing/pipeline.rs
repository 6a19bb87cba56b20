//! Shared send-side plumbing used by both the PUSH worker and the POLL
//! HTTP handlers: read an image's original bytes from storage, run the
//! anonymised DICOM pipeline with its forced tag overrides (spec.md §4.E).

use bytes::Bytes;
use futures::StreamExt;
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::{ImageId, OutgoingImageId};
use slicebox_core::Result;
use slicebox_db::Db;
use slicebox_dicom::{extract_original_identifiers, modify::ModifyOverride, run_outgoing_pipeline, DicomByteParser, PipelineOutput};
use std::sync::Arc;

use slicebox_storage::ObjectStore;

/// Read `image_id`'s stored bytes, resolve its forced tag overrides, and
/// run the anonymised pipeline, returning bytes ready to send over the
/// wire plus the metadata attributes (spec.md §4.C/§4.E).
pub async fn anonymised_bytes_for_outgoing_image(
    db: &Db,
    storage: &Arc<dyn ObjectStore>,
    parser: &Arc<dyn DicomByteParser>,
    anon: &AnonymizationService,
    outgoing_image_id: OutgoingImageId,
    image_id: &ImageId,
) -> Result<PipelineOutput> {
    let bytes = read_all(storage, image_id).await?;

    let tag_values = db.tag_values_for_image(outgoing_image_id).await?;
    let overrides: Vec<ModifyOverride> = tag_values
        .into_iter()
        .map(|tv| ModifyOverride { tag: tv.tag, new_value: tv.value, insert_if_missing: true })
        .collect();

    let buffered: Vec<_> = parser.parse(bytes).collect().await;
    let original = extract_original_identifiers(&buffered, image_id.clone());

    let stream = tokio_stream::iter(buffered);
    run_outgoing_pipeline(stream, original, overrides, anon).await
}

async fn read_all(storage: &Arc<dyn ObjectStore>, image_id: &ImageId) -> Result<Bytes> {
    let mut stream = storage.file_source(image_id).await?;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}
