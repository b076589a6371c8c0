//! Cache Manager
//!
//! Keeps at most one artifact per `(name, platform, arch)` in the cache
//! directory, indexed by the Cache Store. Reads are self-healing: a record
//! whose file disappeared is dropped on lookup. Writes go through
//! [`CacheManager::fetch_version`], which downloads into a hidden partial file,
//! renames it into place, records it and then enforces the size quota.

use crate::config::{Config, RetryConfig};
use crate::db::{CatalogEntry, Database};
use crate::retry::fetch_with_retry;
use crate::source::{AdapterRegistry, SourceAdapter, build_client};
use crate::types::{CacheRecordId, RefreshOutcome};
use crate::{Error, Result};
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Cache policy on top of the Cache Store and the source adapters
///
/// Cheap to clone; clones share the database, adapters and quota lock.
#[derive(Clone)]
pub struct CacheManager {
    db: Arc<Database>,
    registry: Arc<AdapterRegistry>,
    client: reqwest::Client,
    cache_dir: PathBuf,
    max_bytes: u64,
    download_timeout: Duration,
    on_demand_timeout: Duration,
    retry: RetryConfig,
    quota_lock: Arc<Mutex<()>>,
}

impl CacheManager {
    /// Create the manager, creating the cache directory if needed
    pub async fn new(config: &Config, db: Arc<Database>, registry: AdapterRegistry) -> Result<Self> {
        tokio::fs::create_dir_all(&config.cache.cache_dir)
            .await
            .map_err(|e| {
                Error::config(
                    format!(
                        "failed to create cache directory {}: {}",
                        config.cache.cache_dir.display(),
                        e
                    ),
                    "cache_dir",
                )
            })?;
        // Stored paths are absolute so containment checks are plain prefix checks
        let cache_dir = tokio::fs::canonicalize(&config.cache.cache_dir).await?;

        Ok(Self {
            db,
            registry: Arc::new(registry),
            client: build_client(&config.fetch)?,
            cache_dir,
            max_bytes: config.cache.max_cache_bytes(),
            download_timeout: config.fetch.download_timeout,
            on_demand_timeout: config.cache.on_demand_timeout,
            retry: config.fetch.retry.clone(),
            quota_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Cache Store backing this manager
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Absolute cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Adapter serving an entry
    pub fn adapter_for(&self, entry: &CatalogEntry) -> Result<Arc<dyn SourceAdapter>> {
        self.registry.get(entry.website)
    }

    /// Cached artifact of an entry, if present and fresh
    ///
    /// A record whose file is gone is deleted and reported as a miss. A record
    /// older than the entry's stale duration is a miss but is left in place;
    /// the next refresh overwrites it. When the file's existence cannot be
    /// determined the record is kept and the I/O error is returned.
    pub async fn resolve_path(&self, entry: &CatalogEntry) -> Result<Option<PathBuf>> {
        let Some(record) = self
            .db
            .lookup(&entry.name, &entry.platform, &entry.arch)
            .await?
        else {
            return Ok(None);
        };

        let path = record.path();
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    identity = %record.identity(),
                    path = %path.display(),
                    "cached file missing, dropping record"
                );
                self.db.delete(record.id).await?;
                return Ok(None);
            }
            // Unknown state (e.g. permissions): keep the record, report the error
            Err(e) => {
                tracing::warn!(
                    identity = %record.identity(),
                    path = %path.display(),
                    error = %e,
                    "cannot check cached file"
                );
                return Err(Error::Io(e));
            }
        }

        if let Some(days) = entry.stale_duration_days {
            let age = chrono::Utc::now().timestamp() - record.last_modified;
            if age > days.saturating_mul(SECONDS_PER_DAY) {
                tracing::debug!(
                    identity = %record.identity(),
                    age_secs = age,
                    "cached artifact is stale"
                );
                return Ok(None);
            }
        }

        Ok(Some(path))
    }

    /// [`CacheManager::resolve_path`] for an identity given by its parts
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the identity is not in the catalog.
    pub async fn lookup_path(&self, name: &str, platform: &str, arch: &str) -> Result<Option<PathBuf>> {
        let entry = self.catalog_entry(name, platform, arch).await?;
        self.resolve_path(&entry).await
    }

    /// Newest upstream version of an entry
    pub async fn latest_version(&self, entry: &CatalogEntry) -> Result<String> {
        self.adapter_for(entry)?.latest_version(entry).await
    }

    /// Download `version` of an entry into the cache
    ///
    /// A link that fails the adapter's check or a failed download yields an empty
    /// outcome; the previous artifact and record stay untouched in that case.
    /// Template errors propagate.
    pub async fn fetch_version(&self, entry: &CatalogEntry, version: &str) -> Result<RefreshOutcome> {
        let adapter = self.adapter_for(entry)?;
        let identity = entry.identity();

        let url = match checked_link(adapter.as_ref(), adapter.format_url(entry, version)?).await {
            Ok(url) => url,
            Err(e @ Error::InvalidLink { .. }) => {
                tracing::warn!(identity = %identity, error = %e, "download link rejected");
                return Ok(RefreshOutcome::empty(version));
            }
            Err(e) => return Err(e),
        };

        let filename = format!(
            "{}-{}-{}-{}{}",
            entry.name,
            entry.platform,
            entry.arch,
            adapter.file_version(version),
            entry.suffix
        );
        let target = self.artifact_path(&filename)?;

        let bytes = match self.download(&url, &target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(identity = %identity, url = %url, error = %e, "download failed");
                return Ok(RefreshOutcome::empty(version));
            }
        };

        if let Some(previous) = self
            .db
            .lookup(&entry.name, &entry.platform, &entry.arch)
            .await?
            && previous.path() != target
        {
            self.remove_artifact(&previous.path()).await;
        }

        let id = self
            .db
            .upsert(&entry.name, &entry.platform, &entry.arch, version, &target)
            .await?;

        tracing::info!(
            identity = %identity,
            version = %version,
            bytes,
            path = %target.display(),
            "cached new artifact"
        );

        self.evict_until_within_quota(Some(id)).await?;

        Ok(RefreshOutcome {
            path: Some(target),
            version: version.to_string(),
        })
    }

    /// Resolve the newest version of an entry and fetch it
    pub async fn refresh(&self, entry: &CatalogEntry) -> Result<RefreshOutcome> {
        let version = self.latest_version(entry).await?;
        self.fetch_version(entry, &version).await
    }

    /// Artifact for the download front end
    ///
    /// On a miss a refresh is started; if it does not finish within the
    /// on-demand timeout `None` is returned ("temporarily unavailable") and the
    /// refresh keeps running in the background.
    pub async fn get_file(&self, name: &str, platform: &str, arch: &str) -> Result<Option<PathBuf>> {
        let entry = self.catalog_entry(name, platform, arch).await?;
        if let Some(path) = self.resolve_path(&entry).await? {
            return Ok(Some(path));
        }

        let manager = self.clone();
        let identity = entry.identity();
        let handle = tokio::spawn(async move { manager.refresh(&entry).await });

        match tokio::time::timeout(self.on_demand_timeout, handle).await {
            Ok(Ok(outcome)) => Ok(outcome?.path),
            Ok(Err(e)) => Err(Error::Other(format!("refresh task of {} failed: {}", identity, e))),
            Err(_) => {
                tracing::info!(
                    identity = %identity,
                    timeout = ?self.on_demand_timeout,
                    "on-demand refresh still running"
                );
                Ok(None)
            }
        }
    }

    /// Evict oldest artifacts until the cache directory fits the quota
    ///
    /// Never evicts the last remaining record. Returns the number of evicted
    /// records.
    pub async fn enforce_quota(&self) -> Result<usize> {
        self.evict_until_within_quota(None).await
    }

    /// Quota enforcement that never evicts `keep`
    async fn evict_until_within_quota(&self, keep: Option<CacheRecordId>) -> Result<usize> {
        let _guard = self.quota_lock.lock().await;
        let mut evicted = 0;

        loop {
            if self.db.count_cache_records().await? <= 1 {
                break;
            }
            let size = self.cache_size().await?;
            if size <= self.max_bytes {
                break;
            }
            let oldest = match keep {
                Some(keep) => self.db.oldest_except(keep).await?,
                None => self.db.oldest().await?,
            };
            let Some(oldest) = oldest else {
                break;
            };

            tracing::info!(
                identity = %oldest.identity(),
                version = %oldest.version,
                cache_bytes = size,
                max_bytes = self.max_bytes,
                "evicting oldest artifact"
            );
            self.remove_artifact(&oldest.path()).await;
            self.db.delete(oldest.id).await?;
            evicted += 1;
        }

        Ok(evicted)
    }

    /// Total size of the files under the cache directory
    pub async fn cache_size(&self) -> Result<u64> {
        let dir = self.cache_dir.clone();
        tokio::task::spawn_blocking(move || dir_size(&dir))
            .await
            .map_err(|e| Error::Other(format!("cache size task failed: {}", e)))
    }

    async fn catalog_entry(&self, name: &str, platform: &str, arch: &str) -> Result<CatalogEntry> {
        self.db
            .get_catalog_entry(name, platform, arch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{}/{} is not in the catalog", name, platform, arch)))
    }

    fn artifact_path(&self, filename: &str) -> Result<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.cache_dir.join(filename)),
            _ => Err(Error::InvalidPath {
                path: PathBuf::from(filename),
                reason: "artifact name must be a single file name".to_string(),
            }),
        }
    }

    fn is_within_cache(&self, path: &Path) -> bool {
        path.is_absolute()
            && !path.components().any(|c| matches!(c, Component::ParentDir))
            && path.starts_with(&self.cache_dir)
    }

    async fn remove_artifact(&self, path: &Path) {
        if !self.is_within_cache(path) {
            tracing::warn!(path = %path.display(), "refusing to delete file outside the cache directory");
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove artifact"),
        }
    }

    /// Download `url` to `target` through a partial file in the same directory
    async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let part = partial_path(target)?;

        let result = fetch_with_retry(&self.retry, self.download_timeout, url, || {
            self.stream_to(url, &part)
        })
        .await;

        let result = match result {
            Ok(bytes) => tokio::fs::rename(&part, target)
                .await
                .map(|()| bytes)
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }

    async fn stream_to(&self, url: &str, part: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.cache_dir)
            .field("max_bytes", &self.max_bytes)
            .field("registry", &self.registry)
            .finish()
    }
}

/// `.{filename}.part` next to `target`
fn partial_path(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath {
            path: target.to_path_buf(),
            reason: "no file name".to_string(),
        })?;
    Ok(target.with_file_name(format!(".{}.part", name)))
}

/// `url` if the adapter accepts it as a download link, [`Error::InvalidLink`] otherwise
async fn checked_link(adapter: &dyn SourceAdapter, url: String) -> Result<String> {
    if adapter.is_valid_url(&url).await {
        Ok(url)
    } else {
        Err(Error::InvalidLink { url })
    }
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
