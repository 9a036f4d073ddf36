//! Download trigger
//!
//! Saves the current CV for the user:
//! - Remote URLs are streamed to the downloads directory
//! - In-memory documents go through short-lived `blob:` handles that are
//!   always revoked after use
//! - Relative URLs resolve to bundled assets

mod trigger;
mod types;
mod worker;

pub use trigger::{DownloadTrigger, ObjectUrl, ObjectUrlRegistry, SaveTarget};
pub use types::{filename_from_url, DownloadSource, SavedFile, BLOB_SCHEME};
pub use worker::LinkSaver;
