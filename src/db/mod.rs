//! Cache Store for update-fetch
//!
//! Handles SQLite persistence for the expanded catalog and the cache records
//! that point at locally stored artifacts.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] : Database lifecycle, schema migrations
//! - [`catalog`] : Catalog rebuild and queries
//! - [`cache`] : Cache record lookup, upsert, eviction queries
//!
//! Every method issues auto-committed statements; nothing is buffered across
//! calls, so a process interrupted between batch items loses nothing.

use crate::types::{CacheRecordId, Identity, SourceKind};
use serde::Serialize;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod cache;
mod catalog;
mod migrations;

/// One expanded catalog row: an item for one `(platform, arch)` pair
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CatalogEntry {
    /// Catalog item name
    pub name: String,
    /// Catalog page category
    pub category: String,
    /// Catalog page image
    pub image: String,
    /// Source kind resolving versions for this item
    pub website: SourceKind,
    /// Upstream project identifier
    pub project_name: String,
    /// Upstream homepage (the scraped page for F-Droid)
    pub homepage: String,
    /// Download URL template or static link
    pub url_template: String,
    /// Normalized platform
    pub platform: String,
    /// Normalized architecture
    pub arch: String,
    /// Upstream platform naming
    pub original_platform: String,
    /// Upstream architecture naming
    pub original_arch: String,
    /// Artifact file suffix
    pub suffix: String,
    /// Days before a cached artifact is considered stale (None = never)
    pub stale_duration_days: Option<i64>,
    /// Upstream publishes one universal package
    pub single_variant: bool,
    /// Relative lookup path served by the front end
    pub download_path: String,
}

impl CatalogEntry {
    /// Identity used for cache lookup
    pub fn identity(&self) -> Identity {
        Identity::new(&self.name, &self.platform, &self.arch)
    }
}

/// Cache record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CacheRecord {
    /// Unique database ID
    pub id: CacheRecordId,
    /// Catalog item name
    pub name: String,
    /// Normalized platform
    pub platform: String,
    /// Normalized architecture
    pub arch: String,
    /// Opaque upstream version string
    pub version: String,
    /// Absolute path of the stored artifact
    pub abs_path: String,
    /// Unix timestamp of the last insert or refresh
    pub last_modified: i64,
}

impl CacheRecord {
    /// Path of the stored artifact
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.abs_path)
    }

    /// Identity of the cached artifact
    pub fn identity(&self) -> Identity {
        Identity::new(&self.name, &self.platform, &self.arch)
    }
}

/// Catalog entry joined with its cache state, for the catalog page
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CatalogOverviewRow {
    /// Catalog item name
    pub name: String,
    /// Catalog page category
    pub category: String,
    /// Upstream homepage
    pub homepage: String,
    /// Catalog page image
    pub image: String,
    /// Normalized platform
    pub platform: String,
    /// Normalized architecture
    pub arch: String,
    /// Relative lookup path
    pub download_path: String,
    /// Cached version, if any
    pub version: Option<String>,
    /// Unix timestamp of the cached artifact, if any
    pub last_modified: Option<i64>,
}

/// Database handle for update-fetch
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
