//! SQLite pool behind [`SqliteCache`](crate::SqliteCache).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

// Freshness lookups are single-row reads; a handful of connections is plenty
// even with several converters sharing the file.
const POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Connection pool for the freshness database, migrated on open.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// Missing parent directories are created, so a default location under
    /// the user's cache directory works on first run.
    #[instrument(name = "open cache database", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        Self::open(options, POOL_SIZE).await
    }

    /// Open a private in-memory database.
    ///
    /// Not gated behind `cfg(test)`: other crates use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each connection to ":memory:" would otherwise get its own database.
        Self::open(SqliteConnectOptions::new().filename(":memory:"), 1).await
    }

    async fn open(options: SqliteConnectOptions, pool_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .after_connect(|conn, meta| Box::pin(async move { Self::on_connect(conn, meta).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    /// Settings that `SqliteConnectOptions` can't express, applied to every
    /// pooled connection.
    async fn on_connect(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query("PRAGMA temp_store = MEMORY; PRAGMA wal_autocheckpoint = 500;")
            .execute(conn)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for outstanding queries, then close every connection.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = Database::connect_in_memory().await.unwrap();
        let (tables,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cache_entries'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(tables, 1);
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_connect_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache/freshness.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.is_file());
        db.close().await;

        // Reopening runs the already-applied migrations again.
        Database::connect(&path).await.unwrap().close().await;
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let db = Database::connect_in_memory().await.unwrap();
        let (checkpoint,): (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(checkpoint, 500);
        db.close().await;
    }
}
