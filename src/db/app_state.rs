use super::{Database, StorageResult};
use crate::error::StorageError;
use std::future::Future;
use std::sync::Arc;
use turso::Connection;

/// Get SQL for creating app_state table
pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS app_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "
}

/// Small persisted key/value state that survives restarts.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = StorageResult<Option<String>>> + Send;

    /// Upsert `set` and delete `remove` in one transaction: all of it or none.
    fn update(
        &self,
        set: &[(&str, &str)],
        remove: &[&str],
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn set_many(
        &self,
        entries: &[(&str, &str)],
    ) -> impl Future<Output = StorageResult<()>> + Send {
        self.update(entries, &[])
    }
}

/// `app_state` table in the local database.
#[derive(Clone)]
pub struct AppStateStore {
    db: Arc<Database>,
}

impl AppStateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

// ============ App State Functions ============

impl StateStore for AppStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query("SELECT value FROM app_state WHERE key = ?1", turso::params![key])
            .await
            .map_err(StorageError::engine)?;

        if let Some(row) = rows.next().await.map_err(StorageError::engine)? {
            Ok(Some(row.get(0).map_err(StorageError::engine)?))
        } else {
            Ok(None)
        }
    }

    async fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> StorageResult<()> {
        let conn = self.db.connection().await?;
        conn.execute("BEGIN", ()).await.map_err(StorageError::engine)?;

        // Any failure after BEGIN, COMMIT included, must leave the shared
        // connection outside a transaction
        if let Err(e) = write_and_commit(&conn, set, remove).await {
            rollback(&conn).await;
            return Err(e);
        }
        Ok(())
    }
}

async fn write_and_commit(
    conn: &Connection,
    set: &[(&str, &str)],
    remove: &[&str],
) -> StorageResult<()> {
    for (key, value) in set {
        conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = ?2",
            turso::params![*key, *value],
        )
        .await
        .map_err(StorageError::engine)?;
    }

    for key in remove {
        conn.execute("DELETE FROM app_state WHERE key = ?1", turso::params![*key])
            .await
            .map_err(StorageError::engine)?;
    }

    conn.execute("COMMIT", ()).await.map_err(StorageError::engine)?;
    Ok(())
}

async fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute("ROLLBACK", ()).await {
        log::warn!("Failed to roll back app_state transaction: {}", e);
    }
}
