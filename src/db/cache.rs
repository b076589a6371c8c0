//! Cache record lookup, upsert and eviction queries.

use crate::error::DatabaseError;
use crate::types::CacheRecordId;
use crate::{Error, Result};
use std::path::Path;

use super::{CacheRecord, Database};

impl Database {
    /// Point lookup of the cache record for one identity
    pub async fn lookup(&self, name: &str, platform: &str, arch: &str) -> Result<Option<CacheRecord>> {
        sqlx::query_as::<_, CacheRecord>(
            r#"
            SELECT id, name, platform, arch, version, abs_path, last_modified
            FROM cache_records
            WHERE name = ? AND platform = ? AND arch = ?
            "#,
        )
        .bind(name)
        .bind(platform)
        .bind(arch)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to look up cache record: {}",
                e
            )))
        })
    }

    /// Insert the cache record for an identity, or update it in place
    ///
    /// The `(name, platform, arch)` unique index guarantees a single row per
    /// identity; an existing row keeps its id and gets the new version, path
    /// and a fresh `last_modified`.
    pub async fn upsert(
        &self,
        name: &str,
        platform: &str,
        arch: &str,
        version: &str,
        path: &Path,
    ) -> Result<CacheRecordId> {
        let now = chrono::Utc::now().timestamp();
        let path = path.to_string_lossy();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cache_records (name, platform, arch, version, abs_path, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name, platform, arch) DO UPDATE SET
                version = excluded.version,
                abs_path = excluded.abs_path,
                last_modified = excluded.last_modified
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(platform)
        .bind(arch)
        .bind(version)
        .bind(path.as_ref())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert cache record: {}",
                e
            )))
        })?;

        Ok(CacheRecordId(id))
    }

    /// Delete a cache record
    pub async fn delete(&self, id: CacheRecordId) -> Result<()> {
        sqlx::query("DELETE FROM cache_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete cache record: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Cache record with the smallest `last_modified` (ties broken by id)
    pub async fn oldest(&self) -> Result<Option<CacheRecord>> {
        sqlx::query_as::<_, CacheRecord>(
            r#"
            SELECT id, name, platform, arch, version, abs_path, last_modified
            FROM cache_records
            ORDER BY last_modified ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get oldest cache record: {}",
                e
            )))
        })
    }

    /// Oldest cache record other than `keep`
    ///
    /// Used by quota enforcement right after a write, so the record just
    /// written is never the eviction candidate even when it shares its
    /// `last_modified` second with older rows.
    pub async fn oldest_except(&self, keep: CacheRecordId) -> Result<Option<CacheRecord>> {
        sqlx::query_as::<_, CacheRecord>(
            r#"
            SELECT id, name, platform, arch, version, abs_path, last_modified
            FROM cache_records
            WHERE id != ?
            ORDER BY last_modified ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(keep)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get oldest cache record: {}",
                e
            )))
        })
    }

    /// Number of cache records
    pub async fn count_cache_records(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM cache_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count cache records: {}",
                    e
                )))
            })
    }

    /// All cache records, oldest first
    pub async fn list_cache_records(&self) -> Result<Vec<CacheRecord>> {
        sqlx::query_as::<_, CacheRecord>(
            r#"
            SELECT id, name, platform, arch, version, abs_path, last_modified
            FROM cache_records
            ORDER BY last_modified ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list cache records: {}",
                e
            )))
        })
    }

    /// Overwrite `last_modified` of a record
    ///
    /// Used by maintenance tooling and tests to age records deterministically.
    /// Fails with [`DatabaseError::NotFound`] when no record has that id.
    pub async fn set_last_modified(&self, id: CacheRecordId, timestamp: i64) -> Result<()> {
        let result = sqlx::query("UPDATE cache_records SET last_modified = ? WHERE id = ?")
            .bind(timestamp)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update last_modified: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "cache record {}",
                id
            ))));
        }

        Ok(())
    }
}
