//! Download source types and filename helpers

use crate::db::blob_store::FALLBACK_FILENAME;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Write buffer size for streamed downloads (2 MB) - reduces I/O operations
pub const WRITE_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Scheme of handles issued by [`super::ObjectUrlRegistry`].
pub const BLOB_SCHEME: &str = "blob:";

/// What to save for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// Fetchable URL or bundled asset path. Without a filename the last path
    /// segment of the URL is used.
    Url {
        url: String,
        filename: Option<String>,
    },
    /// In-memory document.
    Blob { bytes: Vec<u8>, filename: String },
}

impl DownloadSource {
    pub fn url(url: impl Into<String>) -> Self {
        DownloadSource::Url {
            url: url.into(),
            filename: None,
        }
    }

    pub fn blob(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        DownloadSource::Blob {
            bytes,
            filename: filename.into(),
        }
    }

    pub fn filename(&self) -> String {
        match self {
            DownloadSource::Url {
                filename: Some(name),
                ..
            } => name.clone(),
            DownloadSource::Url { url, .. } => filename_from_url(url),
            DownloadSource::Blob { filename, .. } => filename.clone(),
        }
    }
}

/// Result of a finished save.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SavedFile {
    pub filename: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Last path segment of `url`, without query or fragment, percent-decoded.
pub fn filename_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    if decoded.trim().is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        decoded
    }
}

/// Reduce a suggested filename to a single path component.
pub(crate) fn safe_filename(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_FILENAME)
        .to_string()
}
