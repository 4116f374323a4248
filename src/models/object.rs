//! Represents objects (files) held in the backing bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry returned by a prefix listing.
///
/// Only the fields the gateway needs are kept; the store owns everything else.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key (e.g. `photos/42/3f2c...e1.jpg`).
    pub key: String,

    /// Size in bytes as reported by the store.
    pub size_bytes: u64,

    /// Timestamp when the object was last modified, if the store reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A file written by a single upload request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Storage key under the entity folder.
    pub key: String,

    /// Public URL derived from bucket name and key.
    pub url: String,

    /// Content type (MIME type) inferred from the file extension.
    pub content_type: String,

    /// Number of bytes streamed to the store.
    pub size_bytes: u64,
}

/// Existence and contents of a folder prefix.
///
/// A folder "exists" only while at least one object carries its prefix.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FolderInfo {
    /// Folder name, normalized to end with `/`.
    pub folder: String,

    pub exists: bool,

    /// Public URLs of every object under the folder.
    pub files: Vec<String>,
}
