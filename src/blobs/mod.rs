//! Blob storage backends.
//!
//! A backend always supports `get`; stat, put and delete are optional
//! capabilities a handler advertises through the `*_handler` accessors.
//! Callers (the blob HTTP handler, the eviction loop) test for a capability
//! before invoking it.

mod file;
mod mem;

pub use file::FileBlobHandler;
pub use mem::MemBlobHandler;

use crate::digest::Digest;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("not found")]
    NotFound,

    /// The backend does not hold the bytes itself but knows where they are;
    /// registry clients should be redirected there.
    #[error("redirecting ({code}): {location}")]
    Redirect { location: String, code: u16 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStat: Send + Sync {
    /// Size of the blob without reading it.
    async fn stat(&self, repo: &str, digest: &Digest) -> Result<u64, BlobError>;
}

#[async_trait]
pub trait BlobPut: Send + Sync {
    /// Store the blob. Contents are verified against the expected digest.
    async fn put(&self, repo: &str, digest: &Digest, data: Bytes) -> Result<(), BlobError>;
}

#[async_trait]
pub trait BlobDelete: Send + Sync {
    async fn delete(&self, repo: &str, digest: &Digest) -> Result<(), BlobError>;
}

#[async_trait]
pub trait BlobHandler: Send + Sync {
    async fn get(&self, repo: &str, digest: &Digest) -> Result<Bytes, BlobError>;

    fn stat_handler(&self) -> Option<&dyn BlobStat> {
        None
    }

    fn put_handler(&self) -> Option<&dyn BlobPut> {
        None
    }

    fn delete_handler(&self) -> Option<&dyn BlobDelete> {
        None
    }
}

pub(crate) fn verify_digest(expected: &Digest, data: &[u8]) -> Result<(), BlobError> {
    let actual = Digest::of_bytes(data);
    if &actual != expected {
        return Err(BlobError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
