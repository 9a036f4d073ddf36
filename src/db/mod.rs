use crate::error::StorageError;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use turso::{Builder, Connection};

// Re-export submodules
pub mod app_state;
pub mod blob_store;

pub use app_state::{AppStateStore, StateStore};
pub use blob_store::{BlobStore, SqlBlobStore, StoredBlob};

pub type StorageResult<T> = Result<T, StorageError>;

/// Current version of the local schema.
pub const SCHEMA_VERSION: i64 = 1;

// ============ Connection and Initialization ============

/// Lazily opened local database shared by the blob store and the app state table.
///
/// The connection is wrapped in a Mutex so statements and transactions run one
/// at a time.
pub struct Database {
    path: PathBuf,
    conn: OnceCell<Mutex<Connection>>,
}

impl Database {
    /// Describe a database file. Nothing is opened until the first query.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        let conn = self.conn.get_or_try_init(|| self.open()).await?;
        Ok(conn.lock().await)
    }

    async fn open(&self) -> StorageResult<Mutex<Connection>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::DataDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let path = self
            .path
            .to_str()
            .ok_or_else(|| {
                StorageError::Engine(format!("non UTF-8 path {}", self.path.display()))
            })?;
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(StorageError::engine)?;
        let conn = db.connect().map_err(StorageError::engine)?;

        conn.execute_batch(&format!(
            "{}{}{}",
            "
        CREATE TABLE IF NOT EXISTS schema_meta (
            store TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );
        ",
            blob_store::get_table_sql(),
            app_state::get_table_sql()
        ))
        .await
        .map_err(StorageError::engine)?;

        conn.execute(
            "INSERT INTO schema_meta (store, version) VALUES (?1, ?2)
             ON CONFLICT (store) DO UPDATE SET version = ?2",
            turso::params![blob_store::STORE_NAME, SCHEMA_VERSION],
        )
        .await
        .map_err(StorageError::engine)?;

        log::info!("Opened local store at {}", self.path.display());
        Ok(Mutex::new(conn))
    }

    /// Schema version recorded for the blob store.
    pub async fn schema_version(&self) -> StorageResult<Option<i64>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT version FROM schema_meta WHERE store = ?1",
                turso::params![blob_store::STORE_NAME],
            )
            .await
            .map_err(StorageError::engine)?;

        match rows.next().await.map_err(StorageError::engine)? {
            Some(row) => Ok(Some(row.get(0).map_err(StorageError::engine)?)),
            None => Ok(None),
        }
    }
}
