//! Filesystem-backed `ObjectStore` (spec.md §4.D ambient note): no assumed
//! directory structure beyond a flat root, keys are plain file names, move
//! is `tokio::fs::rename` which is atomic within one filesystem.

use crate::{ObjectSink, ObjectStore, StorageKey};
use bytes::Bytes;
use futures::stream::BoxStream;
use slicebox_core::ids::ImageId;
use slicebox_core::{Result, SliceboxError};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Opens (creating if absent) `root` as the storage backend's directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SliceboxError::internal(format!("cannot create storage root {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

struct FileSink {
    writer: BufWriter<File>,
}

#[async_trait::async_trait]
impl ObjectSink for FileSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.writer
            .write_all(&chunk)
            .await
            .map_err(|e| SliceboxError::internal(format!("write failed: {e}")))
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| SliceboxError::internal(format!("flush failed: {e}")))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    fn image_name(&self, image_id: &ImageId) -> StorageKey {
        image_id.0.clone()
    }

    async fn file_source(&self, image_id: &ImageId) -> Result<BoxStream<'static, Result<Bytes>>> {
        let path = self.path_for(&self.image_name(image_id));
        read_as_stream(path).await
    }

    async fn file_sink(&self, key: &StorageKey) -> Result<Box<dyn ObjectSink>> {
        let path = self.path_for(key);
        let file = File::create(&path)
            .await
            .map_err(|e| SliceboxError::internal(format!("cannot create {}: {e}", path.display())))?;
        Ok(Box::new(FileSink { writer: BufWriter::new(file) }))
    }

    async fn move_object(&self, src: &StorageKey, dst: &StorageKey) -> Result<()> {
        let src_path = self.path_for(src);
        let dst_path = self.path_for(dst);
        tokio::fs::rename(&src_path, &dst_path).await.map_err(|e| {
            SliceboxError::internal(format!("rename {} -> {} failed: {e}", src_path.display(), dst_path.display()))
        })
    }

    async fn delete_from_storage(&self, image_ids: &[ImageId]) -> Result<()> {
        let keys: Vec<StorageKey> = image_ids.iter().map(|id| self.image_name(id)).collect();
        self.delete_by_name(&keys).await
    }

    async fn delete_by_name(&self, keys: &[StorageKey]) -> Result<()> {
        for key in keys {
            let path = self.path_for(key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SliceboxError::internal(format!("delete {} failed: {e}", path.display()))),
            }
        }
        Ok(())
    }
}

async fn read_as_stream(path: PathBuf) -> Result<BoxStream<'static, Result<Bytes>>> {
    use futures::StreamExt;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| SliceboxError::not_found(format!("{}: {e}", path.display())))?;
    let chunks: Vec<Result<Bytes>> = bytes
        .chunks(64 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Ok(futures::stream::iter(chunks).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_move_then_read_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let tmp = crate::temp_key();

        let mut sink = store.file_sink(&tmp).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"hello ")).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"world")).await.unwrap();
        sink.finish().await.unwrap();

        let image_id = ImageId("img-42".to_string());
        let dst = store.image_name(&image_id);
        store.move_object(&tmp, &dst).await.unwrap();

        use futures::StreamExt;
        let mut stream = store.file_source(&image_id).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn delete_by_name_is_idempotent_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        store.delete_by_name(&["tmp-does-not-exist".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn move_of_missing_source_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let err = store.move_object(&"tmp-missing".to_string(), &"dst".to_string()).await;
        assert!(err.is_err());
    }
}
