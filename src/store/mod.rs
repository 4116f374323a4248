//! Object store seam.
//!
//! The file service only needs four primitives from the bucket: write a
//! streamed body under a key, list keys by prefix, delete one key and probe
//! reachability. `S3ObjectStore` talks to the real S3-compatible endpoint,
//! `MemoryObjectStore` keeps everything in-process for development and tests.

pub mod memory;
pub mod s3;

use crate::models::object::ObjectEntry;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};

/// A streamed upload body. Read errors surface as `io::Error`.
pub type BodyStream<'a> = BoxStream<'a, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The upload body could not be read (malformed or truncated multipart part).
    #[error("failed to read upload body: {0}")]
    Body(#[source] io::Error),
    /// The remote store rejected or failed the call.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Primitive operations against a flat-keyed bucket.
///
/// Implementations are stateless after construction and shared across
/// requests behind an `Arc`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `body` into `key` with public-read visibility.
    ///
    /// Returns the number of bytes written.
    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        body: BodyStream<'_>,
    ) -> StoreResult<u64>;

    /// List objects whose key starts with `prefix`, in key order.
    ///
    /// Issues a single listing call; results past the store's page size are
    /// not fetched.
    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>>;

    /// Delete a single object.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Cheap reachability probe for readiness checks.
    async fn check(&self) -> StoreResult<()>;
}
