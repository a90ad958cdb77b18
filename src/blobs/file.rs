use super::{verify_digest, BlobDelete, BlobError, BlobHandler, BlobPut, BlobStat};
use crate::digest::Digest;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Filesystem-backed blob storage, one file per digest. Useful when chart
/// layers should survive a restart.
pub struct FileBlobHandler {
    root: PathBuf,
}

impl FileBlobHandler {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(FileBlobHandler { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.hex())
    }
}

fn map_io(err: std::io::Error) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::NotFound
    } else {
        BlobError::Backend(err.to_string())
    }
}

#[async_trait]
impl BlobHandler for FileBlobHandler {
    async fn get(&self, _repo: &str, digest: &Digest) -> Result<Bytes, BlobError> {
        fs::read(self.blob_path(digest))
            .await
            .map(Bytes::from)
            .map_err(map_io)
    }

    fn stat_handler(&self) -> Option<&dyn BlobStat> {
        Some(self)
    }

    fn put_handler(&self) -> Option<&dyn BlobPut> {
        Some(self)
    }

    fn delete_handler(&self) -> Option<&dyn BlobDelete> {
        Some(self)
    }
}

#[async_trait]
impl BlobStat for FileBlobHandler {
    async fn stat(&self, _repo: &str, digest: &Digest) -> Result<u64, BlobError> {
        fs::metadata(self.blob_path(digest))
            .await
            .map(|m| m.len())
            .map_err(map_io)
    }
}

#[async_trait]
impl BlobPut for FileBlobHandler {
    async fn put(&self, _repo: &str, digest: &Digest, data: Bytes) -> Result<(), BlobError> {
        verify_digest(digest, &data)?;
        let path = self.blob_path(digest);
        // write to a temp file first so readers never observe partial blobs
        let temp = path.with_extension("tmp");
        fs::write(&temp, &data).await.map_err(map_io)?;
        fs::rename(&temp, &path).await.map_err(map_io)?;
        Ok(())
    }
}

#[async_trait]
impl BlobDelete for FileBlobHandler {
    async fn delete(&self, _repo: &str, digest: &Digest) -> Result<(), BlobError> {
        fs::remove_file(self.blob_path(digest)).await.map_err(map_io)
    }
}
