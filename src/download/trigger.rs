//! Download trigger and the revocable blob handles it hands out.

use super::types::{safe_filename, DownloadSource, SavedFile, BLOB_SCHEME};
use crate::error::DownloadError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Issues temporary `blob:` handles for in-memory documents.
#[derive(Default)]
pub struct ObjectUrlRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return a handle that is revoked when dropped.
    pub fn create_object_url(&self, bytes: Vec<u8>) -> ObjectUrl<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let href = format!("{}cv-vault/{}", BLOB_SCHEME, id);
        self.entries().insert(href.clone(), Arc::new(bytes));
        ObjectUrl {
            registry: self,
            href,
        }
    }

    pub fn resolve(&self, href: &str) -> Option<Arc<Vec<u8>>> {
        self.entries().get(href).cloned()
    }

    /// Returns false if the handle was already revoked.
    pub fn revoke(&self, href: &str) -> bool {
        self.entries().remove(href).is_some()
    }

    /// Number of handles not yet revoked.
    pub fn outstanding(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A live `blob:` handle. Revoked on drop, on every exit path.
pub struct ObjectUrl<'a> {
    registry: &'a ObjectUrlRegistry,
    href: String,
}

impl ObjectUrl<'_> {
    pub fn as_str(&self) -> &str {
        &self.href
    }
}

impl Drop for ObjectUrl<'_> {
    fn drop(&mut self) {
        if !self.registry.revoke(&self.href) {
            log::warn!("Blob handle {} was already revoked", self.href);
        }
    }
}

/// Where the user's copy ends up.
pub trait SaveTarget: Send + Sync {
    /// Save the resource behind `href` as `filename`. `blob:` hrefs resolve
    /// through `blobs`.
    fn save(
        &self,
        href: &str,
        filename: &str,
        blobs: &ObjectUrlRegistry,
    ) -> impl Future<Output = Result<SavedFile, DownloadError>> + Send;
}

pub struct DownloadTrigger<S> {
    registry: ObjectUrlRegistry,
    target: S,
}

impl<S: SaveTarget> DownloadTrigger<S> {
    pub fn new(target: S) -> Self {
        Self {
            registry: ObjectUrlRegistry::new(),
            target,
        }
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    pub async fn trigger_download(
        &self,
        source: DownloadSource,
    ) -> Result<SavedFile, DownloadError> {
        let filename = safe_filename(&source.filename());
        match source {
            DownloadSource::Url { url, .. } => {
                log::info!("Saving {} as {}", url, filename);
                self.target.save(&url, &filename, &self.registry).await
            }
            DownloadSource::Blob { bytes, .. } => {
                let handle = self.registry.create_object_url(bytes);
                log::info!("Saving {} as {}", handle.as_str(), filename);
                let result = self
                    .target
                    .save(handle.as_str(), &filename, &self.registry)
                    .await;
                drop(handle);
                result
            }
        }
    }
}
