//! Object storage abstraction (spec.md §4.D): a byte sink/source keyed by
//! image id, with temp-file staging and atomic rename semantics.
//!
//! `ObjectStore` is a narrow trait so a non-filesystem backend is a drop-in
//! later, mirroring the teacher's adapter-behind-trait shape used for its
//! storage and handler adapters.

mod fs_store;
mod temp;

pub use fs_store::FsObjectStore;
pub use temp::{schedule_cleanup, temp_key};

use bytes::Bytes;
use futures::stream::BoxStream;
use slicebox_core::ids::ImageId;
use slicebox_core::Result;

/// A storage key: either a stable `imageName(id)` or a transient `tmp-<uuid>`.
pub type StorageKey = String;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// `imageName(imageId) -> path`.
    fn image_name(&self, image_id: &ImageId) -> StorageKey;

    /// `fileSource(imageId) -> Stream<ByteString>`.
    async fn file_source(&self, image_id: &ImageId) -> Result<BoxStream<'static, Result<Bytes>>>;

    /// `fileSink(path) -> Sink<ByteString, Done>`. Returns a handle that
    /// buffers writes to `key` and must be finished with `finish_sink`.
    async fn file_sink(&self, key: &StorageKey) -> Result<Box<dyn ObjectSink>>;

    /// `move(srcPath, dstPath)`. Atomic within this backend.
    async fn move_object(&self, src: &StorageKey, dst: &StorageKey) -> Result<()>;

    /// `deleteFromStorage([imageId...])`.
    async fn delete_from_storage(&self, image_ids: &[ImageId]) -> Result<()>;

    /// `deleteByName([path...])`.
    async fn delete_by_name(&self, keys: &[StorageKey]) -> Result<()>;
}

/// A write handle returned by `ObjectStore::file_sink`. Callers write chunks
/// and then call `finish` exactly once; dropping without finishing leaves a
/// partial temp file for the caller's own cleanup scheduling.
#[async_trait::async_trait]
pub trait ObjectSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;
    async fn finish(self: Box<Self>) -> Result<()>;
}
