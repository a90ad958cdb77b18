use super::{verify_digest, BlobDelete, BlobError, BlobHandler, BlobPut, BlobStat};
use crate::digest::Digest;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory blob storage, the production default. The store is ephemeral:
/// contents vanish when the process exits.
#[derive(Default)]
pub struct MemBlobHandler {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemBlobHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobHandler for MemBlobHandler {
    async fn get(&self, _repo: &str, digest: &Digest) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .get(digest.as_str())
            .cloned()
            .ok_or(BlobError::NotFound)
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
impl BlobStat for MemBlobHandler {
    async fn stat(&self, _repo: &str, digest: &Digest) -> Result<u64, BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .get(digest.as_str())
            .map(|b| b.len() as u64)
            .ok_or(BlobError::NotFound)
    }
}

#[async_trait]
impl BlobPut for MemBlobHandler {
    async fn put(&self, _repo: &str, digest: &Digest, data: Bytes) -> Result<(), BlobError> {
        verify_digest(digest, &data)?;
        self.blobs
            .lock()
            .unwrap()
            .insert(digest.as_str().to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl BlobDelete for MemBlobHandler {
    async fn delete(&self, _repo: &str, digest: &Digest) -> Result<(), BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .remove(digest.as_str())
            .map(|_| ())
            .ok_or(BlobError::NotFound)
    }
}
