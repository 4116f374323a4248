//! In-process object store for local development and tests.

use super::{BodyStream, ObjectStore, StoreError, StoreResult};
use crate::models::object::ObjectEntry;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, MemoryObject>,
    puts: usize,
    deletes: usize,
    fail_put_at: Option<usize>,
    fail_delete_at: Option<usize>,
}

/// Keeps objects in a sorted map so prefix listings come back in key order,
/// like an S3 ListObjectsV2 page.
///
/// Failure injection makes the Nth put or delete (1-based, counted over the
/// store's lifetime) fail with a backend error.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th call to `put_stream`.
    pub fn fail_put_at(mut self, n: usize) -> Self {
        self.state.get_mut().fail_put_at = Some(n);
        self
    }

    /// Fail the `n`th call to `delete`.
    pub fn fail_delete_at(mut self, n: usize) -> Self {
        self.state.get_mut().fail_delete_at = Some(n);
        self
    }

    /// Insert an object directly, bypassing the upload path.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, content_type: &str) {
        let mut state = self.state.lock().await;
        state.objects.insert(
            key.into(),
            MemoryObject {
                data: data.into(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
    }

    /// All stored keys in order.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.objects.keys().cloned().collect()
    }

    /// Body of a stored object.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .objects
            .get(key)
            .map(|obj| obj.data.clone())
    }

    /// Content type recorded for a stored object.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .objects
            .get(key)
            .map(|obj| obj.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        mut body: BodyStream<'_>,
    ) -> StoreResult<u64> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk.map_err(StoreError::Body)?);
        }

        let mut state = self.state.lock().await;
        state.puts += 1;
        if state.fail_put_at == Some(state.puts) {
            return Err(StoreError::backend(format!("injected put failure for `{key}`")));
        }

        let len = buf.len() as u64;
        state.objects.insert(
            key.to_string(),
            MemoryObject {
                data: buf.freeze(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(len)
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectEntry {
                key: key.clone(),
                size_bytes: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.deletes += 1;
        if state.fail_delete_at == Some(state.deletes) {
            return Err(StoreError::backend(format!("injected delete failure for `{key}`")));
        }
        // S3 treats deleting a missing key as success.
        state.objects.remove(key);
        Ok(())
    }

    async fn check(&self) -> StoreResult<()> {
        Ok(())
    }
}
