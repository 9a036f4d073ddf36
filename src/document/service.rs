//! Mode reconciliation between the configured URL and the locally stored PDF.

use super::types::{DocumentMode, DocumentState, MODE_KEY, PDF_MIME_TYPE, URL_KEY};
use crate::db::{BlobStore, StateStore, StorageResult, StoredBlob};
use crate::download::DownloadSource;
use crate::error::{Result, ValidationError};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Read the persisted document configuration.
///
/// Absent, malformed or unreadable entries fall back to `Url` mode and
/// `default_url`; this never fails.
pub async fn load_document_config<K: StateStore>(store: &K, default_url: &str) -> DocumentState {
    let url = match store.get(URL_KEY).await {
        Ok(Some(url)) if !url.trim().is_empty() => url,
        Ok(_) => default_url.to_string(),
        Err(e) => {
            warn!("Failed to read {}: {}, using default", URL_KEY, e);
            default_url.to_string()
        }
    };

    let mode = match store.get(MODE_KEY).await {
        Ok(Some(tag)) => DocumentMode::parse(&tag).unwrap_or_else(|| {
            warn!("Ignoring malformed {} value {:?}", MODE_KEY, tag);
            DocumentMode::Url
        }),
        Ok(None) => DocumentMode::Url,
        Err(e) => {
            warn!("Failed to read {}: {}, using default", MODE_KEY, e);
            DocumentMode::Url
        }
    };

    DocumentState { mode, url }
}

/// Owns the current document mode and the durable blob behind `File` mode.
pub struct DocumentService<B, K> {
    blobs: B,
    state_store: K,
    default_url: String,
    state: watch::Sender<DocumentState>,
    /// Set when `reset` could not clear the stored blob.
    stale_blob: AtomicBool,
}

impl<B: BlobStore, K: StateStore> DocumentService<B, K> {
    /// Build the service from persisted state.
    pub async fn init(blobs: B, state_store: K, default_url: impl Into<String>) -> Self {
        let default_url = default_url.into();
        let initial = load_document_config(&state_store, &default_url).await;
        info!("Document mode on startup: {} ({})", initial.mode, initial.url);
        Self::with_state(blobs, state_store, default_url, initial)
    }

    /// Build the service with an explicit initial state, bypassing persistence.
    pub fn with_state(
        blobs: B,
        state_store: K,
        default_url: impl Into<String>,
        initial: DocumentState,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            blobs,
            state_store,
            default_url: default_url.into(),
            state,
            stale_blob: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> DocumentMode {
        self.state.borrow().mode
    }

    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    pub fn state(&self) -> DocumentState {
        self.state.borrow().clone()
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    /// Observe every successful mode/url change.
    pub fn subscribe(&self) -> watch::Receiver<DocumentState> {
        self.state.subscribe()
    }

    /// Switch to `Url` mode. Any stored blob is left in place but becomes stale.
    pub async fn set_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl.into());
        }

        self.persist(&[(URL_KEY, url), (MODE_KEY, DocumentMode::Url.as_str())], &[])
            .await;
        self.state.send_replace(DocumentState::url_mode(url));
        info!("Document mode -> url ({})", url);
        Ok(())
    }

    /// Store a PDF and switch to `File` mode once it is durably saved.
    pub async fn set_file(&self, file: StoredBlob) -> Result<()> {
        if !file.mime_type.trim().eq_ignore_ascii_case(PDF_MIME_TYPE) {
            return Err(ValidationError::NotPdf {
                mime_type: file.mime_type,
            }
            .into());
        }

        self.blobs.save(&file).await?;
        self.stale_blob.store(false, Ordering::SeqCst);

        self.persist(&[(MODE_KEY, DocumentMode::File.as_str())], &[])
            .await;
        self.state.send_modify(|state| state.mode = DocumentMode::File);
        info!("Document mode -> file ({}, {} bytes)", file.filename, file.bytes.len());
        Ok(())
    }

    /// Stored blob, regardless of the current mode. A blob that `reset` failed
    /// to clear reads as absent.
    pub async fn get_file(&self) -> StorageResult<Option<StoredBlob>> {
        if self.stale_blob.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.blobs.get().await
    }

    /// Return to `Url` mode with the default URL. Never fails.
    pub async fn reset(&self) {
        match self.blobs.clear().await {
            Ok(()) => self.stale_blob.store(false, Ordering::SeqCst),
            Err(e) => {
                warn!("Failed to clear stored document during reset: {}", e);
                self.stale_blob.store(true, Ordering::SeqCst);
            }
        }

        // Dropping the url key lets the next startup pick up the configured default
        self.persist(&[(MODE_KEY, DocumentMode::Url.as_str())], &[URL_KEY])
            .await;
        self.state
            .send_replace(DocumentState::url_mode(self.default_url.clone()));
        info!("Document mode reset to default url ({})", self.default_url);
    }

    /// Resolve what the user should receive right now.
    ///
    /// `File` mode without a stored blob falls back to the URL.
    pub async fn current_source(&self) -> StorageResult<DownloadSource> {
        let state = self.state();
        if state.mode == DocumentMode::File {
            if let Some(file) = self.get_file().await? {
                return Ok(DownloadSource::blob(file.bytes, file.filename));
            }
            warn!("File mode without a stored document, falling back to {}", state.url);
        }
        Ok(DownloadSource::url(state.url))
    }

    async fn persist(&self, set: &[(&str, &str)], remove: &[&str]) {
        if let Err(e) = self.state_store.update(set, remove).await {
            warn!("Failed to persist document state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AppStateStore, Database, SqlBlobStore};
    use crate::error::{Error, StorageError};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const DEFAULT_URL: &str = "assets/cv/cv.pdf";

    #[derive(Default, Clone)]
    struct MemoryState(Arc<Mutex<HashMap<String, String>>>);

    impl StateStore for MemoryState {
        async fn get(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> StorageResult<()> {
            let mut map = self.0.lock().unwrap();
            for (k, v) in set {
                map.insert(k.to_string(), v.to_string());
            }
            for k in remove {
                map.remove(*k);
            }
            Ok(())
        }
    }

    /// Blob store whose writes and clears always fail.
    #[derive(Default)]
    struct BrokenBlobs;

    impl BlobStore for BrokenBlobs {
        async fn save(&self, _record: &StoredBlob) -> StorageResult<()> {
            Err(StorageError::Engine("quota exceeded".into()))
        }

        async fn get(&self) -> StorageResult<Option<StoredBlob>> {
            Ok(None)
        }

        async fn clear(&self) -> StorageResult<()> {
            Err(StorageError::Engine("transaction aborted".into()))
        }
    }

    /// Blob store that keeps what it saves but can never clear it.
    #[derive(Default)]
    struct StickyBlobs {
        record: Mutex<Option<StoredBlob>>,
    }

    impl BlobStore for StickyBlobs {
        async fn save(&self, record: &StoredBlob) -> StorageResult<()> {
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }

        async fn get(&self) -> StorageResult<Option<StoredBlob>> {
            Ok(self.record.lock().unwrap().clone())
        }

        async fn clear(&self) -> StorageResult<()> {
            Err(StorageError::Engine("transaction aborted".into()))
        }
    }

    fn pdf(bytes: &[u8], name: &str) -> StoredBlob {
        StoredBlob::new(bytes.to_vec(), name, PDF_MIME_TYPE)
    }

    async fn local_service(
        dir: &tempfile::TempDir,
    ) -> DocumentService<SqlBlobStore, AppStateStore> {
        let db = Arc::new(Database::new(dir.path().join("cv-vault.db")));
        DocumentService::init(
            SqlBlobStore::new(db.clone()),
            AppStateStore::new(db),
            DEFAULT_URL,
        )
        .await
    }

    #[tokio::test]
    async fn fresh_service_starts_in_url_mode_with_default() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;
        assert_eq!(service.mode(), DocumentMode::Url);
        assert_eq!(service.url(), DEFAULT_URL);
    }

    #[tokio::test]
    async fn stored_pdf_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;
        let bytes: Vec<u8> = b"%PDF-1.7\n\x00\xff\x10binary"
            .iter()
            .copied()
            .cycle()
            .take(10_000)
            .collect();

        service.set_file(pdf(&bytes, "Jane_Doe.pdf")).await.unwrap();

        let record = service.get_file().await.unwrap().unwrap();
        assert_eq!(record.bytes, bytes);
        assert_eq!(record.filename, "Jane_Doe.pdf");
        assert_eq!(service.mode(), DocumentMode::File);
    }

    #[tokio::test]
    async fn url_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = local_service(&dir).await;
            service.set_url("  https://example.com/cv.pdf ").await.unwrap();
        }

        let reloaded = local_service(&dir).await;
        assert_eq!(reloaded.mode(), DocumentMode::Url);
        assert_eq!(reloaded.url(), "https://example.com/cv.pdf");
    }

    #[tokio::test]
    async fn file_mode_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = local_service(&dir).await;
            service.set_url("https://example.com/old.pdf").await.unwrap();
            service.set_file(pdf(b"%PDF", "cv.pdf")).await.unwrap();
        }

        let reloaded = local_service(&dir).await;
        assert_eq!(reloaded.mode(), DocumentMode::File);
        assert_eq!(reloaded.url(), "https://example.com/old.pdf");
        assert!(reloaded.get_file().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_url_is_rejected_without_side_effects() {
        let state = MemoryState::default();
        let service =
            DocumentService::init(BrokenBlobs::default(), state.clone(), DEFAULT_URL).await;
        let mut rx = service.subscribe();

        let err = service.set_url("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyUrl)));
        assert!(state.0.lock().unwrap().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_and_mode_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;
        service.set_url("https://example.com/cv.pdf").await.unwrap();

        let err = service
            .set_file(StoredBlob::new(b"hello".to_vec(), "cv.txt", "text/plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::NotPdf { .. })));
        assert_eq!(service.mode(), DocumentMode::Url);
        assert_eq!(service.get_file().await.unwrap(), None);

        let reloaded = local_service(&dir).await;
        assert_eq!(reloaded.mode(), DocumentMode::Url);
        assert_eq!(reloaded.url(), "https://example.com/cv.pdf");
    }

    #[tokio::test]
    async fn failed_save_leaves_mode_unchanged() {
        let state = MemoryState::default();
        let service =
            DocumentService::init(BrokenBlobs::default(), state.clone(), DEFAULT_URL).await;

        let err = service.set_file(pdf(b"%PDF", "cv.pdf")).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(service.mode(), DocumentMode::Url);
        assert_eq!(state.0.lock().unwrap().get(MODE_KEY), None);
    }

    #[tokio::test]
    async fn reset_restores_default_after_file_mode() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;
        service.set_url("https://example.com/cv.pdf").await.unwrap();
        service.set_file(pdf(b"%PDF", "cv.pdf")).await.unwrap();

        service.reset().await;

        assert_eq!(service.mode(), DocumentMode::Url);
        assert_eq!(service.url(), DEFAULT_URL);
        assert_eq!(service.get_file().await.unwrap(), None);

        let reloaded = local_service(&dir).await;
        assert_eq!(reloaded.state(), DocumentState::url_mode(DEFAULT_URL));
    }

    #[tokio::test]
    async fn reset_completes_when_clear_fails() {
        let state = MemoryState::default();
        let service =
            DocumentService::init(StickyBlobs::default(), state.clone(), DEFAULT_URL).await;
        service.set_url("https://example.com/cv.pdf").await.unwrap();
        service.set_file(pdf(b"%PDF", "a.pdf")).await.unwrap();

        service.reset().await;

        assert_eq!(service.state(), DocumentState::url_mode(DEFAULT_URL));
        assert_eq!(service.get_file().await.unwrap(), None);
        assert!(matches!(
            service.current_source().await.unwrap(),
            DownloadSource::Url { .. }
        ));
        let persisted = state.0.lock().unwrap().clone();
        assert_eq!(persisted.get(MODE_KEY).map(String::as_str), Some("url"));
        assert_eq!(persisted.get(URL_KEY), None);

        service.set_file(pdf(b"%PDF-2", "b.pdf")).await.unwrap();
        let record = service.get_file().await.unwrap().unwrap();
        assert_eq!(record.filename, "b.pdf");
    }

    #[tokio::test]
    async fn reset_then_reload_picks_up_new_default() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = local_service(&dir).await;
            service.set_url("https://example.com/cv.pdf").await.unwrap();
            service.reset().await;
        }

        let db = Arc::new(Database::new(dir.path().join("cv-vault.db")));
        let reloaded = DocumentService::init(
            SqlBlobStore::new(db.clone()),
            AppStateStore::new(db),
            "assets/cv/cv-2025.pdf",
        )
        .await;
        assert_eq!(
            reloaded.state(),
            DocumentState::url_mode("assets/cv/cv-2025.pdf")
        );
    }

    #[tokio::test]
    async fn malformed_persisted_state_falls_back_to_defaults() {
        let state = MemoryState::default();
        state
            .set_many(&[(MODE_KEY, "pdf"), (URL_KEY, "  ")])
            .await
            .unwrap();

        let loaded = load_document_config(&state, DEFAULT_URL).await;
        assert_eq!(loaded, DocumentState::url_mode(DEFAULT_URL));
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;
        let mut rx = service.subscribe();

        service.set_url("https://example.com/a.pdf").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().url, "https://example.com/a.pdf");

        service.set_file(pdf(b"%PDF", "a.pdf")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().mode, DocumentMode::File);

        service.reset().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), DocumentState::url_mode(DEFAULT_URL));
    }

    #[tokio::test]
    async fn current_source_follows_mode() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(&dir).await;

        service.set_file(pdf(b"%PDF-1.4", "mine.pdf")).await.unwrap();
        match service.current_source().await.unwrap() {
            DownloadSource::Blob { bytes, filename } => {
                assert_eq!(bytes.as_slice(), b"%PDF-1.4");
                assert_eq!(filename, "mine.pdf");
            }
            other => panic!("expected blob source, got {:?}", other),
        }

        service.set_url("https://example.com/hosted.pdf").await.unwrap();
        match service.current_source().await.unwrap() {
            DownloadSource::Url { url, .. } => assert_eq!(url, "https://example.com/hosted.pdf"),
            other => panic!("expected url source, got {:?}", other),
        }
    }
}
