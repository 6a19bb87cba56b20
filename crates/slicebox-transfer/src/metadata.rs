//! Narrow interface to the (out-of-scope) metadata indexing service
//! (spec.md §1: "metadata indexing is treated as a service with a narrow
//! message interface").

use async_trait::async_trait;
use slicebox_core::ids::ImageId;
use slicebox_core::model::MetadataAttributes;
use slicebox_core::Result;

#[async_trait]
pub trait MetadataSink: Send + Sync + 'static {
    /// Hand extracted attributes to the metadata service; it replies with
    /// the `imageId` to store bytes under (spec.md §4.F step 3).
    async fn add_metadata(&self, attrs: MetadataAttributes) -> Result<ImageId>;
}
