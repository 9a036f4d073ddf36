//! Durable single-record store for the uploaded CV.

use super::{Database, StorageResult};
use crate::error::StorageError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

pub const STORE_NAME: &str = "files";

/// The only key ever written to the store.
pub const RECORD_KEY: &str = "cv-pdf";

/// Filename reported for records stored without one.
pub const FALLBACK_FILENAME: &str = "cv.pdf";

/// Get SQL for creating the blob table
pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS files (
        key TEXT PRIMARY KEY,
        blob TEXT NOT NULL,
        filename TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
    "
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

impl StoredBlob {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Storage for at most one binary document.
///
/// Each operation is atomic on its own: a failed `save` leaves the previous
/// record in place. Implementations never retry.
pub trait BlobStore: Send + Sync {
    fn save(&self, record: &StoredBlob) -> impl Future<Output = StorageResult<()>> + Send;

    /// `Ok(None)` when nothing is stored.
    fn get(&self) -> impl Future<Output = StorageResult<Option<StoredBlob>>> + Send;

    fn clear(&self) -> impl Future<Output = StorageResult<()>> + Send;
}

/// [`BlobStore`] backed by the `files` table.
#[derive(Clone)]
pub struct SqlBlobStore {
    db: Arc<Database>,
}

impl SqlBlobStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl BlobStore for SqlBlobStore {
    async fn save(&self, record: &StoredBlob) -> StorageResult<()> {
        let encoded = BASE64.encode(&record.bytes);
        let now = chrono::Utc::now().timestamp();

        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO files (key, blob, filename, mime_type, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (key) DO UPDATE SET
                blob = ?2, filename = ?3, mime_type = ?4, updated_at = ?5",
            turso::params![
                RECORD_KEY,
                encoded,
                record.filename.clone(),
                record.mime_type.clone(),
                now,
            ],
        )
        .await
        .map_err(StorageError::engine)?;

        log::debug!("Stored {} ({} bytes)", record.filename, record.bytes.len());
        Ok(())
    }

    async fn get(&self) -> StorageResult<Option<StoredBlob>> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT blob, filename, mime_type FROM files WHERE key = ?1",
                turso::params![RECORD_KEY],
            )
            .await
            .map_err(StorageError::engine)?;

        let Some(row) = rows.next().await.map_err(StorageError::engine)? else {
            return Ok(None);
        };

        let encoded: String = row.get(0).map_err(StorageError::engine)?;
        let filename: String = row.get(1).map_err(StorageError::engine)?;
        let mime_type: String = row.get(2).map_err(StorageError::engine)?;

        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let filename = if filename.is_empty() {
            FALLBACK_FILENAME.to_string()
        } else {
            filename
        };

        Ok(Some(StoredBlob {
            bytes,
            filename,
            mime_type,
        }))
    }

    async fn clear(&self) -> StorageResult<()> {
        let conn = self.db.connection().await?;
        conn.execute("DELETE FROM files WHERE key = ?1", turso::params![RECORD_KEY])
            .await
            .map_err(StorageError::engine)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> SqlBlobStore {
        SqlBlobStore::new(Arc::new(Database::new(dir.path().join("blobs.db"))))
    }

    #[tokio::test]
    async fn empty_store_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(&dir).get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(&dir);

        blobs
            .save(&StoredBlob::new(b"%PDF-1.4 old".to_vec(), "old.pdf", "application/pdf"))
            .await
            .unwrap();
        let binary: Vec<u8> = (0..=255u8).collect();
        blobs
            .save(&StoredBlob::new(binary.clone(), "new.pdf", "application/pdf"))
            .await
            .unwrap();

        let record = blobs.get().await.unwrap().unwrap();
        assert_eq!(record.bytes, binary);
        assert_eq!(record.filename, "new.pdf");
        assert_eq!(record.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn clear_empties_store_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(&dir);

        blobs
            .save(&StoredBlob::new(vec![1, 2, 3], "cv.pdf", "application/pdf"))
            .await
            .unwrap();
        blobs.clear().await.unwrap();
        blobs.clear().await.unwrap();
        assert_eq!(blobs.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        store(&dir)
            .save(&StoredBlob::new(vec![9; 4096], "", "application/pdf"))
            .await
            .unwrap();

        let record = store(&dir).get().await.unwrap().unwrap();
        assert_eq!(record.bytes, vec![9; 4096]);
        assert_eq!(record.filename, FALLBACK_FILENAME);
    }
}
