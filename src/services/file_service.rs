//! src/services/file_service.rs
//!
//! FileService: upload, delete and listing orchestration over an
//! `ObjectStore`. The gateway keeps no index of its own: every read is a live
//! listing against the bucket, every write goes straight to the store.
//!
//! Batches are not transactional. A failed upload leaves the parts written
//! before it in place, and a failed delete leaves the keys removed before it
//! removed; neither is rolled back nor reported.

use crate::{
    models::object::{FolderInfo, StoredObject},
    services::key_scheme::{
        PublicUrls, SegmentIssue, content_type_for, ensure_segment_safe, entity_prefix,
        new_object_key, normalize_folder, sub_id_prefix,
    },
    store::{BodyStream, ObjectStore, StoreError},
};
use async_trait::async_trait;
use axum::{
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};
use futures::StreamExt;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("invalid parameter `{0}`")]
    InvalidParameter(&'static str),
    #[error("failed to read multipart data: {0}")]
    Multipart(String),
    #[error("request body exceeds the upload limit: {0}")]
    PayloadTooLarge(String),
    #[error("file extension {0:?} is not allowed")]
    DisallowedExtension(String),
    #[error("no files present in multipart body")]
    NoFiles,
    #[error("no objects found with prefix `{0}`")]
    NotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FileError {
    fn from(err: StoreError) -> Self {
        match err {
            // The store only sees the body through the multipart reader, so a
            // read failure is a broken request, not a broken store.
            StoreError::Body(io_err) if io_err.kind() == io::ErrorKind::FileTooLarge => {
                FileError::PayloadTooLarge(io_err.to_string())
            }
            StoreError::Body(io_err) => FileError::Multipart(io_err.to_string()),
            other => FileError::Store(other),
        }
    }
}

pub type FileResult<T> = Result<T, FileError>;

/// One section of a multipart body.
pub struct Part<'a> {
    /// File name from `Content-Disposition`; `None` for plain form fields.
    pub file_name: Option<String>,
    pub body: BodyStream<'a>,
}

/// Sequential source of multipart parts.
///
/// A part borrows the source, so parts are consumed one at a time in the
/// order the client sent them.
#[async_trait]
pub trait PartStream: Send {
    async fn next_part<'s>(&'s mut self) -> FileResult<Option<Part<'s>>>;
}

#[async_trait]
impl PartStream for Multipart {
    async fn next_part<'s>(&'s mut self) -> FileResult<Option<Part<'s>>> {
        let field = match self.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(err) => return Err(multipart_error(&err)),
        };

        let file_name = field.file_name().map(str::to_string);
        let body = field
            .map(|chunk| {
                chunk.map_err(|err| {
                    let kind = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        io::ErrorKind::FileTooLarge
                    } else {
                        io::ErrorKind::InvalidData
                    };
                    io::Error::new(kind, err.body_text())
                })
            })
            .boxed();

        Ok(Some(Part { file_name, body }))
    }
}

/// Keep the body-limit case apart so it can be answered with 413.
fn multipart_error(err: &MultipartError) -> FileError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        FileError::PayloadTooLarge(err.body_text())
    } else {
        FileError::Multipart(err.body_text())
    }
}

/// FileService owns the key scheme and the batch semantics; the store only
/// ever sees single-object calls.
#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,
    urls: PublicUrls,
    /// Lower-cased extensions (dot included). Empty disables filtering.
    allowed_extensions: Arc<[String]>,
}

impl FileService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        urls: PublicUrls,
        allowed_extensions: impl IntoIterator<Item = String>,
    ) -> Self {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        Self {
            store,
            urls,
            allowed_extensions,
        }
    }

    fn is_extension_allowed(&self, ext: &str) -> bool {
        self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Stream every file part of `parts` into `photos/{id}/{uuid}{ext}`.
    ///
    /// Parts without a file name are form fields and are skipped. The
    /// extension allow-list is checked per part before anything is written,
    /// so the body is read exactly once. Returns the stored objects in
    /// request order, or fails the whole batch on the first bad part or
    /// failed write.
    pub async fn upload<P>(&self, id: &str, parts: &mut P) -> FileResult<Vec<StoredObject>>
    where
        P: PartStream + ?Sized,
    {
        require_segment("id", id)?;

        let mut uploaded = Vec::new();
        while let Some(part) = parts.next_part().await? {
            let Some(file_name) = part.file_name.filter(|name| !name.is_empty()) else {
                debug!(id, "skipping form field");
                continue;
            };

            let (key, ext) = new_object_key(id, &file_name);
            if !self.is_extension_allowed(&ext) {
                warn!(id, %file_name, %ext, "rejecting file with disallowed extension");
                return Err(FileError::DisallowedExtension(ext.to_ascii_lowercase()));
            }

            let content_type = content_type_for(&ext);
            let size_bytes = self.store.put_stream(&key, content_type, part.body).await?;
            info!(id, %file_name, %key, content_type, size_bytes, "uploaded file");

            uploaded.push(StoredObject {
                url: self.urls.url(&key),
                key,
                content_type: content_type.to_string(),
                size_bytes,
            });
        }

        if uploaded.is_empty() {
            return Err(FileError::NoFiles);
        }
        Ok(uploaded)
    }

    /// Delete every object under `photos/{id}/`.
    pub async fn delete_entity(&self, id: &str) -> FileResult<Vec<String>> {
        require_segment("id", id)?;
        self.delete_by_prefix(&entity_prefix(id)).await
    }

    /// Delete every object under `photos/{id}/` whose token starts with `sub_id`.
    pub async fn delete_by_sub_id(&self, id: &str, sub_id: &str) -> FileResult<Vec<String>> {
        require_segment("id", id)?;
        require_segment("sub_id", sub_id)?;
        self.delete_by_prefix(&sub_id_prefix(id, sub_id)).await
    }

    /// Resolve `prefix` to concrete keys and delete them one by one.
    ///
    /// The first failed delete aborts the batch; keys deleted before it stay
    /// deleted and the remaining ones are left untouched.
    async fn delete_by_prefix(&self, prefix: &str) -> FileResult<Vec<String>> {
        let keys: Vec<String> = self
            .store
            .list_prefix(prefix)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();

        if keys.is_empty() {
            return Err(FileError::NotFound(prefix.to_string()));
        }

        for (done, key) in keys.iter().enumerate() {
            if let Err(err) = self.store.delete(key).await {
                warn!(prefix, %key, deleted = done, error = %err, "delete batch aborted");
                return Err(err.into());
            }
        }

        info!(prefix, count = keys.len(), "deleted objects");
        Ok(keys)
    }

    /// Public URLs of every object in the bucket (first listing page only).
    pub async fn list_all(&self) -> FileResult<Vec<String>> {
        let entries = self.store.list_prefix("").await?;
        Ok(entries.iter().map(|entry| self.urls.url(&entry.key)).collect())
    }

    /// Report whether `folder` holds any object, plus their URLs.
    ///
    /// `"photos/42"` and `"photos/42/"` are the same folder.
    pub async fn folder_info(&self, folder: &str) -> FileResult<FolderInfo> {
        if folder.trim().is_empty() {
            return Err(FileError::MissingParameter("folder"));
        }

        let folder = normalize_folder(folder);
        let files: Vec<String> = self
            .store
            .list_prefix(&folder)
            .await?
            .iter()
            .map(|entry| self.urls.url(&entry.key))
            .collect();

        Ok(FolderInfo {
            exists: !files.is_empty(),
            folder,
            files,
        })
    }

    /// Probe the backing store.
    pub async fn check_store(&self) -> FileResult<()> {
        self.store.check().await.map_err(FileError::from)
    }
}

fn require_segment(name: &'static str, value: &str) -> FileResult<()> {
    ensure_segment_safe(value).map_err(|issue| match issue {
        SegmentIssue::Missing => FileError::MissingParameter(name),
        SegmentIssue::Invalid => FileError::InvalidParameter(name),
    })
}
