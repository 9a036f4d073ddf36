//! Error taxonomy shared by the document, storage, upload and download paths.
//!
//! Every terminal failure maps to one [`ErrorCategory`] so callers can show a
//! message that tells validation, storage, exhausted uploads and remote
//! misconfiguration apart.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Input rejected before any state was touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document URL must not be empty")]
    EmptyUrl,
    #[error("expected an application/pdf document, got {mime_type:?}")]
    NotPdf { mime_type: String },
}

/// Failure of the local durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage engine error: {0}")]
    Engine(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn engine(err: impl std::fmt::Display) -> Self {
        StorageError::Engine(err.to_string())
    }
}

/// How the upload pipeline should react to a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after a delay.
    Retryable,
    /// Needs the remote store to be reconfigured; retrying is futile.
    Configuration,
    /// Any other terminal rejection.
    Fatal,
}

/// Failure talking to the remote object store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote store unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },
    #[error("remote store denied the request ({status}): {body}")]
    AccessDenied { status: u16, body: String },
    #[error("invalid remote endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("remote store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl TransportError {
    /// Map an HTTP status (and response body) to a transport error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 | 429 | 500..=599 => TransportError::Unavailable { status, body },
            401 | 403 => TransportError::AccessDenied { status, body },
            404 => TransportError::NotFound(body),
            _ if body.contains("CORS") => TransportError::AccessDenied { status, body },
            _ => TransportError::Rejected { status, body },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::Network(_) | TransportError::Unavailable { .. } => {
                ErrorClass::Retryable
            }
            TransportError::AccessDenied { .. } | TransportError::InvalidEndpoint(_) => {
                ErrorClass::Configuration
            }
            TransportError::NotFound(_) | TransportError::Rejected { .. } => ErrorClass::Fatal,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return TransportError::InvalidEndpoint(err.to_string());
        }
        match err.status() {
            Some(status) => TransportError::from_status(status.as_u16(), err.to_string()),
            None => TransportError::Network(err.to_string()),
        }
    }
}

/// Terminal failure of an upload or of resolving its public URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload of {path} rejected by remote configuration; server-side CORS/access configuration required: {source}")]
    Configuration {
        path: String,
        #[source]
        source: TransportError,
    },
    #[error("upload failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("upload failed: {0}")]
    Failed(#[source] TransportError),
    #[error("{path} has not been uploaded")]
    NotUploaded { path: String },
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Failure while saving a document for the user.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("blob handle {0} was revoked or never issued")]
    HandleRevoked(String),
    #[error("download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("bundled asset {0} does not exist")]
    AssetMissing(PathBuf),
    #[error("asset path {0} escapes the assets directory")]
    InvalidAssetPath(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure loading [`crate::AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Storage,
    Upload,
    Configuration,
    Download,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Upload(UploadError::Configuration { .. }) | Error::Config(_) => {
                ErrorCategory::Configuration
            }
            Error::Upload(_) => ErrorCategory::Upload,
            Error::Download(_) => ErrorCategory::Download,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(ValidationError::EmptyUrl) => {
                "Please enter a CV URL.".to_string()
            }
            Error::Validation(ValidationError::NotPdf { .. }) => {
                "Please select a PDF file.".to_string()
            }
            Error::Storage(e) => format!("The CV could not be stored locally: {}", e),
            Error::Upload(UploadError::Configuration { .. }) => {
                "Upload blocked by the storage bucket's configuration. Server-side CORS/access configuration required.".to_string()
            }
            Error::Upload(UploadError::RetriesExhausted { attempts, .. }) => format!(
                "Upload failed after {} attempts. Check your connection and try again.",
                attempts
            ),
            Error::Upload(e) => format!("Upload failed: {}", e),
            Error::Download(e) => format!("Download failed: {}", e),
            Error::Config(e) => format!("Invalid configuration: {}", e),
        }
    }
}
