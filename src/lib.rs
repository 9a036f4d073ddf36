//! cv-vault: a single user-owned CV document, sourced from a URL or a stored file.
//!
//! - `db`: local database holding the document blob and persisted state
//! - `document`: mode service deciding which source is authoritative
//! - `remote` / `upload`: publishing to an S3-compatible bucket with retries
//! - `download`: saving the current document for the user
//! - `app`: startup wiring

pub mod app;
pub mod config;
pub mod db;
pub mod document;
pub mod download;
pub mod error;
pub mod remote;
pub mod upload;

pub use app::{CvVault, LocalDocumentService};
pub use config::{AppConfig, RemoteConfig, RetryPolicy};
pub use db::StoredBlob;
pub use document::{DocumentMode, DocumentState};
pub use download::{DownloadSource, SavedFile};
pub use error::{Error, ErrorCategory, Result};
pub use upload::{ProgressStream, UploadCompleted, UploadPipeline};
