//! Storage key layout and public URL scheme.
//!
//! Every uploaded file lives at `photos/{id}/{uuid}{ext}`. An entity "folder"
//! is nothing more than the `photos/{id}/` prefix; it exists while at least
//! one key carries it.

use uuid::Uuid;

/// Root prefix shared by every entity folder.
pub const ROOT_PREFIX: &str = "photos";

/// Content type used when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Prefix covering every object of an entity: `photos/{id}/`.
pub fn entity_prefix(id: &str) -> String {
    format!("{ROOT_PREFIX}/{id}/")
}

/// Prefix matching objects of an entity whose token starts with `sub_id`.
///
/// No trailing separator: a partial token matches every key that starts with it.
pub fn sub_id_prefix(id: &str, sub_id: &str) -> String {
    format!("{ROOT_PREFIX}/{id}/{sub_id}")
}

pub fn object_key(id: &str, token: &str, ext: &str) -> String {
    format!("{ROOT_PREFIX}/{id}/{token}{ext}")
}

/// Build a fresh key for `file_name` under entity `id`.
///
/// Returns the key together with the extension it was built from.
pub fn new_object_key(id: &str, file_name: &str) -> (String, String) {
    let ext = extension_of(file_name).to_string();
    let key = object_key(id, &Uuid::new_v4().to_string(), &ext);
    (key, ext)
}

/// Extension of the last path element, dot included, case preserved.
///
/// `"dir/photo.JPG"` gives `".JPG"`, `"archive.tar.gz"` gives `".gz"` and a
/// name without a dot gives `""`.
pub fn extension_of(file_name: &str) -> &str {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.rfind('.').map_or("", |pos| &base[pos..])
}

/// Make sure a folder name ends with `/`.
pub fn normalize_folder(name: &str) -> String {
    if name.ends_with('/') {
        name.to_string()
    } else {
        format!("{name}/")
    }
}

/// Map a file extension to a MIME type, falling back to
/// `application/octet-stream`.
pub fn content_type_for(ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "htm" | "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Why a path segment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentIssue {
    Missing,
    Invalid,
}

/// Validate a value that is spliced into a key prefix (entity id, sub id).
///
/// Path parameters arrive percent-decoded, so a `%2F` in the URL would
/// otherwise let a caller reach into another entity's folder.
pub fn ensure_segment_safe(value: &str) -> Result<(), SegmentIssue> {
    if value.trim().is_empty() {
        return Err(SegmentIssue::Missing);
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(SegmentIssue::Invalid);
    }
    if value.bytes().any(|b| b.is_ascii_control()) {
        return Err(SegmentIssue::Invalid);
    }
    Ok(())
}

/// Builds public URLs of the form `https://{bucket}.{host}/{key}`.
///
/// Deterministic; no signing, no expiry.
#[derive(Clone, Debug)]
pub struct PublicUrls {
    bucket: String,
    host: String,
}

impl PublicUrls {
    pub fn new(bucket: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            host: host.into(),
        }
    }

    pub fn url(&self, key: &str) -> String {
        format!("https://{}.{}/{}", self.bucket, self.host, key)
    }
}
