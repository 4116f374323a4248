//! S3-compatible object store backed by the AWS SDK.
//!
//! Uploads are streamed in fixed-size parts so memory per request stays
//! bounded by one part regardless of the file size:
//! - a body that fits in the first part goes out as a single PutObject
//! - anything larger becomes a multipart upload, aborted if any part fails

use super::{BodyStream, ObjectStore, StoreError, StoreResult};
use crate::models::object::ObjectEntry;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl},
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::fmt;
use tracing::{debug, warn};

/// Host of the S3-compatible provider. Objects are addressed virtual-host style
/// (`{bucket}.{host}`), which is also how public URLs are built.
pub const STORE_HOST: &str = "s3.timeweb.cloud";

/// Signing region expected by the provider.
pub const SIGNING_REGION: &str = "ru-1";

/// Part size for streamed uploads. S3 requires every part but the last to be
/// at least 5 MiB.
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Connection settings for the S3 backend.
#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
    pub region: String,
}

impl S3Settings {
    /// Settings for the fixed provider endpoint and region.
    pub fn new(
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoint: format!("https://{STORE_HOST}"),
            region: SIGNING_REGION.to_string(),
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("access_key", &"[hidden]")
            .field("secret_key", &"[hidden]")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client with static credentials against the configured endpoint.
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "photo-gateway-config",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .credentials_provider(credentials)
            .build();

        Self::with_client(Client::from_conf(config), settings.bucket.clone())
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn put_single(&self, key: &str, content_type: &str, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    /// Upload `first` and every remaining chunk of `reader` as parts of
    /// multipart upload `upload_id`.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut PartReader<'_>,
    ) -> StoreResult<(Vec<CompletedPart>, u64)> {
        let mut parts = Vec::new();
        let mut written = 0u64;
        let mut next = Some(first);
        let mut part_number: i32 = 1;

        while let Some(chunk) = next {
            let len = chunk.len() as u64;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(map_sdk_error)?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            written += len;
            debug!(key, part_number, len, "uploaded part");

            part_number += 1;
            next = reader.next_chunk().await?;
        }

        Ok((parts, written))
    }

    async fn put_multipart(
        &self,
        key: &str,
        content_type: &str,
        first: Bytes,
        reader: &mut PartReader<'_>,
    ) -> StoreResult<u64> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::backend("store did not return an upload id"))?
            .to_string();

        let (parts, written) = match self.upload_parts(key, &upload_id, first, reader).await {
            Ok(done) => done,
            Err(err) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(err);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        if let Err(err) = completed {
            self.abort_multipart(key, &upload_id).await;
            return Err(map_sdk_error(err));
        }

        Ok(written)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(
                key,
                upload_id,
                error = %DisplayErrorContext(err),
                "failed to abort multipart upload"
            );
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        body: BodyStream<'_>,
    ) -> StoreResult<u64> {
        let mut reader = PartReader::new(body, PART_SIZE);
        let first = reader.next_chunk().await?.unwrap_or_default();

        if reader.is_exhausted() {
            let len = first.len() as u64;
            self.put_single(key, content_type, first).await?;
            return Ok(len);
        }

        self.put_multipart(key, content_type, first, &mut reader)
            .await
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .send()
            .await
            .map_err(map_sdk_error)?;

        if output.is_truncated() == Some(true) {
            warn!(prefix, "listing truncated by the store; remaining keys are not fetched");
        }

        let entries = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                Some(ObjectEntry {
                    key,
                    size_bytes: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())),
                })
            })
            .collect();

        Ok(entries)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn check(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

fn map_sdk_error<E>(err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

/// Re-chunks an upload body into parts of exactly `part_size` bytes (the last
/// one may be shorter).
pub(crate) struct PartReader<'a> {
    body: BodyStream<'a>,
    buf: BytesMut,
    part_size: usize,
    done: bool,
}

impl<'a> PartReader<'a> {
    pub(crate) fn new(body: BodyStream<'a>, part_size: usize) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
            part_size,
            done: false,
        }
    }

    /// Next full part, the trailing short part, or `None` once drained.
    pub(crate) async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        while !self.done && self.buf.len() < self.part_size {
            match self.body.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk.map_err(StoreError::Body)?),
                None => self.done = true,
            }
        }

        if self.buf.is_empty() {
            return Ok(None);
        }
        let take = self.buf.len().min(self.part_size);
        Ok(Some(self.buf.split_to(take).freeze()))
    }

    /// True when the body ended and every buffered byte was handed out.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.done && self.buf.is_empty()
    }
}
