//! Cache persisted in SQLite.

use crate::error::{ErrorKind, Result};
use crate::{Cache, Database};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use std::time::Duration;
use time::OffsetDateTime;

/// Cache entries stored in a SQLite table.
///
/// Entries survive process restarts, so freshness markers written by one
/// command-line invocation are honoured by the next. Expired rows are
/// ignored on read and removed by [`purge_expired()`](Self::purge_expired).
#[derive(Debug, Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
}
impl From<&Database> for SqliteCache {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete every expired row, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/purge_expired.sql"))
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(removed = result.rows_affected(), "Purged expired cache entries");
        Ok(result.rows_affected())
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn expiry_millis(ttl: Duration) -> Result<i64> {
    let ttl = i64::try_from(ttl.as_millis()).or_raise(|| ErrorKind::InvalidTtl)?;
    now_millis().checked_add(ttl).ok_or_else(|| exn::Exn::from(ErrorKind::InvalidTtl))
}

#[async_trait]
impl Cache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        sqlx::query(include_str!("../queries/set_entry.sql"))
            .bind(key)
            .bind(value)
            .bind(expiry_millis(ttl)?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/forget_entry.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
