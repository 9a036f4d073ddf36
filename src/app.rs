//! Startup wiring: database, document service, upload pipeline and download trigger.

use crate::config::AppConfig;
use crate::db::{AppStateStore, Database, SqlBlobStore};
use crate::document::DocumentService;
use crate::download::{DownloadSource, DownloadTrigger, LinkSaver, SavedFile};
use crate::error::Result;
use crate::remote::S3ObjectStore;
use crate::upload::UploadPipeline;
use log::info;
use std::sync::Arc;

pub type LocalDocumentService = DocumentService<SqlBlobStore, AppStateStore>;

/// Everything an embedding application needs, built once at startup.
pub struct CvVault {
    db: Arc<Database>,
    documents: LocalDocumentService,
    uploads: Option<UploadPipeline<S3ObjectStore>>,
    downloads: DownloadTrigger<LinkSaver>,
}

impl CvVault {
    /// Open the database and restore the persisted document state.
    ///
    /// The upload pipeline is only available when `config.remote` is set.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let db = Arc::new(Database::new(config.database_path()));
        let version = db.schema_version().await?;
        info!(
            "Opened document database at {} (schema v{})",
            db.path().display(),
            version.unwrap_or_default()
        );

        let documents = DocumentService::init(
            SqlBlobStore::new(db.clone()),
            AppStateStore::new(db.clone()),
            config.default_url.clone(),
        )
        .await;

        let http = reqwest::Client::new();
        let uploads = config.remote.as_ref().map(|remote| {
            info!("Remote uploads enabled for bucket {}", remote.bucket);
            UploadPipeline::new(
                Arc::new(S3ObjectStore::new(remote, http.clone())),
                config.retry,
                remote.prefix.clone(),
            )
        });

        let downloads = DownloadTrigger::new(LinkSaver::new(
            http,
            config.download_dir.clone(),
            config.assets_dir.clone(),
        ));

        Ok(Self {
            db,
            documents,
            uploads,
            downloads,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn documents(&self) -> &LocalDocumentService {
        &self.documents
    }

    pub fn uploads(&self) -> Option<&UploadPipeline<S3ObjectStore>> {
        self.uploads.as_ref()
    }

    pub fn downloads(&self) -> &DownloadTrigger<LinkSaver> {
        &self.downloads
    }

    /// Save the current document (stored file or URL) into the downloads directory.
    pub async fn download_current(&self) -> Result<SavedFile> {
        let source = self.documents.current_source().await?;
        let saved = self.download(source).await?;
        Ok(saved)
    }

    pub async fn download(&self, source: DownloadSource) -> Result<SavedFile> {
        Ok(self.downloads.trigger_download(source).await?)
    }
}
