//! Black-box test for invariant 5 and Seed Scenarios S2/S3: replaying
//! `POST /incoming` with the same `(token, txId, seq)` must not move
//! `receivedImageCount`/`addedImageCount` past what one delivery produces,
//! and must resolve to the same stored image.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use slicebox_anon::AnonymizationService;
use slicebox_core::ids::{ImageId, OutgoingTransactionId};
use slicebox_core::model::{MetadataAttributes, SendMethod};
use slicebox_core::Result;
use slicebox_db::Db;
use slicebox_dicom::{tags, DicomByteParser, DicomPart, ValidationContexts};
use slicebox_storage::{FsObjectStore, ObjectStore};
use slicebox_transfer::{handle_incoming, EventBus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.7";
const TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.1";

/// Always emits the same canned part sequence regardless of the bytes
/// handed in; stands in for a real DICOM parser crate in this test.
struct FixedPartsParser;

impl DicomByteParser for FixedPartsParser {
    fn parse(&self, _bytes: Bytes) -> BoxStream<'static, DicomPart> {
        let parts = vec![
            DicomPart::MetaPart {
                sop_class_uid: SOP_CLASS_UID.to_string(),
                transfer_syntax_uid: TRANSFER_SYNTAX_UID.to_string(),
            },
            DicomPart::Header { tag: tags::PATIENT_NAME, vr: "PN".into(), length: Some(8) },
            DicomPart::ValueChunk(b"Doe^Jane".to_vec()),
            DicomPart::Header { tag: tags::SOP_INSTANCE_UID, vr: "UI".into(), length: Some(9) },
            DicomPart::ValueChunk(b"1.2.3.4.5".to_vec()),
        ];
        Box::pin(stream::iter(parts))
    }
}

/// Mints one `ImageId` per distinct SOP Instance UID and reuses it on
/// repeat deliveries, the way a real metadata/indexing service would
/// dedupe on content rather than minting a fresh id every call.
#[derive(Default)]
struct DedupingMetadataSink {
    by_sop_instance_uid: Mutex<HashMap<String, ImageId>>,
}

#[async_trait]
impl slicebox_transfer::MetadataSink for DedupingMetadataSink {
    async fn add_metadata(&self, attrs: MetadataAttributes) -> Result<ImageId> {
        let sop_instance_uid = attrs.get(tags::SOP_INSTANCE_UID).unwrap_or_default().to_string();
        let mut seen = self.by_sop_instance_uid.lock().unwrap();
        if let Some(id) = seen.get(&sop_instance_uid) {
            return Ok(id.clone());
        }
        let id = ImageId(format!("img-{sop_instance_uid}"));
        seen.insert(sop_instance_uid, id.clone());
        Ok(id)
    }
}

#[sqlx::test(migrations = "../slicebox-db/migrations")]
async fn replayed_incoming_post_is_idempotent(pool: sqlx::PgPool) {
    let db = Db::from_pool(pool);
    let box_ = db.insert_box("sender", "shared-token", "http://sender", SendMethod::Push).await.unwrap();

    let storage_dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::open(storage_dir.path()).await.unwrap());
    let parser: Arc<dyn DicomByteParser> = Arc::new(FixedPartsParser);
    let metadata: Arc<dyn slicebox_transfer::MetadataSink> = Arc::new(DedupingMetadataSink::default());
    let anon = AnonymizationService::new(db.clone());
    let events = EventBus::new();
    let contexts = ValidationContexts::new(vec![(SOP_CLASS_UID.to_string(), TRANSFER_SYNTAX_UID.to_string())]);
    let outgoing_transaction_id = OutgoingTransactionId::new();

    let deliver = || {
        handle_incoming(
            &db,
            &storage,
            &parser,
            &anon,
            &metadata,
            &events,
            &contexts,
            Duration::from_millis(0),
            "shared-token",
            outgoing_transaction_id,
            1,
            1,
            Bytes::from_static(b"irrelevant, FixedPartsParser ignores this"),
        )
    };

    let first = deliver().await.unwrap();
    assert_eq!(first.received_image_count, 1);
    assert_eq!(first.added_image_count, 1);

    let second = deliver().await.unwrap();
    assert_eq!(second.received_image_count, 1);
    assert_eq!(second.added_image_count, 1);

    let third = deliver().await.unwrap();
    assert_eq!(third.received_image_count, 1);
    assert_eq!(third.added_image_count, 1);

    assert_eq!(box_.send_method, SendMethod::Push);

    let stored = db
        .incoming_transaction_by_box_and_outgoing_id(box_.id, outgoing_transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.received_image_count, 1);
    assert_eq!(stored.added_image_count, 1);
}
