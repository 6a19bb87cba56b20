//! Placeholder collaborators for the two external services spec.md §1
//! Non-goals explicitly put outside this crate: DICOM byte parsing and
//! metadata indexing. Both are narrow traits (`DicomByteParser`,
//! `MetadataSink`) the rest of the crate is written against; a real
//! deployment substitutes its own implementation at this composition
//! root, the same seam the teacher leaves for a platform-specific
//! `device_secure_store` backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use slicebox_core::ids::ImageId;
use slicebox_core::model::MetadataAttributes;
use slicebox_core::Result;
use slicebox_dicom::{DicomByteParser, DicomPart};
use slicebox_transfer::MetadataSink;

/// Emits no parts for any input. Wired in only so the binary links and
/// starts; a real deployment supplies a real DICOM parser crate here.
pub struct UnimplementedDicomParser;

impl DicomByteParser for UnimplementedDicomParser {
    fn parse(&self, bytes: Bytes) -> BoxStream<'static, DicomPart> {
        tracing::error!(
            byte_len = bytes.len(),
            "no DicomByteParser configured; substitute a real parser at the composition root"
        );
        Box::pin(stream::empty())
    }
}

/// Accepts metadata and mints a fresh `ImageId`, without persisting or
/// indexing anything. Stands in for the out-of-scope metadata service.
pub struct DiscardingMetadataSink;

#[async_trait]
impl MetadataSink for DiscardingMetadataSink {
    async fn add_metadata(&self, attrs: MetadataAttributes) -> Result<ImageId> {
        tracing::warn!(
            attribute_count = attrs.0.len(),
            "no MetadataSink configured; discarding attributes and minting a bare image id"
        );
        Ok(ImageId(uuid::Uuid::new_v4().to_string()))
    }
}
