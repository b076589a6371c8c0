//! Catalog rebuild and queries.

use crate::error::DatabaseError;
use crate::types::SourceKind;
use crate::{Error, Result};

use super::{CatalogEntry, CatalogOverviewRow, Database};

const CATALOG_COLUMNS: &str = r#"
    name, category, image, website, project_name, homepage, url_template,
    platform, arch, original_platform, original_arch, suffix,
    stale_duration_days, single_variant, download_path
"#;

impl Database {
    /// Replace the whole catalog with `entries`
    ///
    /// Delete and inserts run in one transaction: readers see either the old
    /// catalog or the new one, and a rejected entry (e.g. a duplicate
    /// `(name, platform, arch)`) leaves the old catalog in place.
    pub async fn reload_catalog(&self, entries: &[CatalogEntry]) -> Result<()> {
        let query_failed = |context: &'static str| {
            move |e: sqlx::Error| {
                Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
            }
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Failed to begin catalog reload"))?;

        sqlx::query("DELETE FROM catalog_entries")
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to clear catalog"))?;

        for entry in entries {
            sqlx::query(&format!(
                "INSERT INTO catalog_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                CATALOG_COLUMNS
            ))
            .bind(&entry.name)
            .bind(&entry.category)
            .bind(&entry.image)
            .bind(entry.website)
            .bind(&entry.project_name)
            .bind(&entry.homepage)
            .bind(&entry.url_template)
            .bind(&entry.platform)
            .bind(&entry.arch)
            .bind(&entry.original_platform)
            .bind(&entry.original_arch)
            .bind(&entry.suffix)
            .bind(entry.stale_duration_days)
            .bind(entry.single_variant)
            .bind(&entry.download_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.is_unique_violation()
                {
                    return Error::Database(DatabaseError::ConstraintViolation(format!(
                        "duplicate catalog entry {}",
                        entry.identity()
                    )));
                }
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert catalog entry: {}",
                    e
                )))
            })?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit catalog reload"))?;

        tracing::info!(entries = entries.len(), "catalog reloaded");
        Ok(())
    }

    /// Get the catalog entry for one identity
    pub async fn get_catalog_entry(
        &self,
        name: &str,
        platform: &str,
        arch: &str,
    ) -> Result<Option<CatalogEntry>> {
        sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT {} FROM catalog_entries WHERE name = ? AND platform = ? AND arch = ?",
            CATALOG_COLUMNS
        ))
        .bind(name)
        .bind(platform)
        .bind(arch)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get catalog entry: {}",
                e
            )))
        })
    }

    /// List the whole catalog ordered by source, then name
    pub async fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT {} FROM catalog_entries ORDER BY website, name, platform, arch",
            CATALOG_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list catalog: {}",
                e
            )))
        })
    }

    /// List catalog entries handled by one source
    pub async fn list_catalog_by_source(&self, source: SourceKind) -> Result<Vec<CatalogEntry>> {
        sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT {} FROM catalog_entries WHERE website = ? ORDER BY name, platform, arch",
            CATALOG_COLUMNS
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list catalog by source: {}",
                e
            )))
        })
    }

    /// Catalog entries with their cached version, for rendering the catalog page
    pub async fn catalog_overview(&self) -> Result<Vec<CatalogOverviewRow>> {
        sqlx::query_as::<_, CatalogOverviewRow>(
            r#"
            SELECT
                c.name, c.category, c.homepage, c.image, c.platform, c.arch,
                c.download_path, r.version, r.last_modified
            FROM catalog_entries c
            LEFT JOIN cache_records r
                ON r.name = c.name AND r.platform = c.platform AND r.arch = c.arch
            ORDER BY c.category, c.name, c.platform, c.arch
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to build catalog overview: {}",
                e
            )))
        })
    }
}
