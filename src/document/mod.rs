//! Document mode service
//!
//! Decides whether the configured URL or the locally stored PDF is the current
//! CV, and persists that choice across restarts.

mod service;
mod types;

pub use service::{load_document_config, DocumentService};
pub use types::{DocumentMode, DocumentState, MODE_KEY, PDF_MIME_TYPE, URL_KEY};
