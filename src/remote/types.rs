//! Remote store types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cache policy written on every uploaded object.
pub const CACHE_CONTROL: &str = "public, max-age=3600";

/// Custom metadata key carrying the upload timestamp.
pub const UPLOADED_AT_KEY: &str = "uploaded-at";

/// Called with (bytes_transferred, total_bytes) as the body is sent.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Metadata attached to each upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub cache_control: String,
    pub uploaded_at: String,
}

impl ObjectMetadata {
    pub fn now(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: CACHE_CONTROL.to_string(),
            uploaded_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: i64,
    pub last_modified: String,
}

/// Content type for an object path, by extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Encode an object key for use in a URL path, keeping `/` as separator
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
