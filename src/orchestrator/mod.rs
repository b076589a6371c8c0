//! Batch Orchestrator
//!
//! One batch run refreshes the whole catalog:
//!
//! 1. reload the catalog document into the Cache Store and load the mirror state
//! 2. partition entries by source kind; partitions run concurrently
//! 3. inside a partition, rounds of at most `concurrent_amount` entries run
//!    concurrently, each round after the previous one finished
//! 4. new versions are uploaded and old ones trimmed from the mirror
//! 5. the mirror state is flushed once, only if every partition succeeded
//!
//! Rate limiting abandons the remaining rounds of its source only; item-level
//! errors skip the item; anything else is reported and fails the run.

use crate::cache::CacheManager;
use crate::catalog::{expand_catalog, load_catalog};
use crate::config::Config;
use crate::db::{CatalogEntry, Database};
use crate::mirror::MirrorState;
use crate::notify::{NoOpNotifier, Notifier, RssNotifier};
use crate::source::AdapterRegistry;
use crate::types::{BatchReport, Identity, ItemOutcome, SourceKind};
use crate::upload::{MinioUploader, NoOpUploader, Uploader};
use crate::Result;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Title of reports sent when a run fails
const FAILURE_TITLE: &str = "update-fetch batch run failed";

/// Outcome of one source partition
#[derive(Debug, Default)]
struct PartitionReport {
    items: Vec<(Identity, ItemOutcome)>,
    rate_limited: bool,
}

/// Drives batch runs over the catalog
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: Arc<Config>,
    manager: CacheManager,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
}

impl BatchOrchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        config: Arc<Config>,
        manager: CacheManager,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            manager,
            uploader,
            notifier,
        }
    }

    /// Wire the production collaborators described by `config`
    ///
    /// Opens the database, registers the built-in adapters, and picks the
    /// MinIO uploader and RSS notifier when they are configured.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.cache.database_path).await?);
        let registry = AdapterRegistry::from_config(&config.fetch)?;
        let manager = CacheManager::new(&config, db, registry).await?;

        let uploader: Arc<dyn Uploader> = match &config.mirror.upload {
            Some(upload) => Arc::new(MinioUploader::from_config(upload)?),
            None => Arc::new(NoOpUploader),
        };
        let notifier: Arc<dyn Notifier> = match &config.notifications.rss {
            Some(rss) => Arc::new(RssNotifier::new(rss.clone())),
            None => Arc::new(NoOpNotifier),
        };

        Ok(Self::new(Arc::new(config), manager, uploader, notifier))
    }

    /// Cache manager used by this orchestrator
    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    /// Reload the catalog document, then refresh every entry
    pub async fn run(&self) -> Result<BatchReport> {
        let result = async {
            self.reload_catalog().await?;
            self.refresh_catalog().await
        }
        .await;
        self.report_failure(result).await
    }

    /// Refresh every entry of the catalog currently in the Cache Store
    pub async fn run_catalog(&self) -> Result<BatchReport> {
        let result = self.refresh_catalog().await;
        self.report_failure(result).await
    }

    /// Expand the catalog document and replace the stored catalog with it
    pub async fn reload_catalog(&self) -> Result<usize> {
        let catalog_path = self.config.catalog_path.clone();
        let catalog =
            tokio::task::spawn_blocking(move || load_catalog(&catalog_path))
                .await
                .map_err(|e| crate::Error::Other(format!("catalog loader failed: {}", e)))??;

        let entries = expand_catalog(&catalog, &self.config.fetch.endpoints, &self.config.defaults)?;
        self.manager.db().reload_catalog(&entries).await?;
        Ok(entries.len())
    }

    async fn report_failure(&self, result: Result<BatchReport>) -> Result<BatchReport> {
        if let Err(e) = &result {
            tracing::error!(error = %e, "batch run failed");
            self.notifier.report(FAILURE_TITLE, &e.to_string()).await;
        }
        result
    }

    async fn refresh_catalog(&self) -> Result<BatchReport> {
        let mirror = Mutex::new(MirrorState::load(&self.config.mirror).await?);
        let entries = self.manager.db().list_catalog().await?;
        let total = entries.len();

        let mut partitions: BTreeMap<SourceKind, Vec<CatalogEntry>> = BTreeMap::new();
        for entry in entries {
            partitions.entry(entry.website).or_default().push(entry);
        }

        tracing::info!(entries = total, sources = partitions.len(), "batch run started");

        let results = join_all(
            partitions
                .iter()
                .map(|(kind, entries)| self.run_partition(*kind, entries, &mirror)),
        )
        .await;

        let mut report = BatchReport::default();
        let mut first_error = None;
        for ((kind, _), result) in partitions.iter().zip(results) {
            match result {
                Ok(partition) => {
                    if partition.rate_limited {
                        report.rate_limited_sources.push(*kind);
                    }
                    report.items.extend(partition.items);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        mirror.lock().await.flush().await?;

        tracing::info!(
            refreshed = report.refreshed_count(),
            attempted = report.items.len(),
            rate_limited = ?report.rate_limited_sources,
            "batch run finished"
        );
        Ok(report)
    }

    async fn run_partition(
        &self,
        kind: SourceKind,
        entries: &[CatalogEntry],
        mirror: &Mutex<MirrorState>,
    ) -> Result<PartitionReport> {
        let mut report = PartitionReport::default();
        let round_size = self.config.fetch.concurrent_amount.max(1);

        for (round, chunk) in entries.chunks(round_size).enumerate() {
            tracing::debug!(source = %kind, round, entries = chunk.len(), "starting round");

            let outcomes = join_all(chunk.iter().map(|entry| self.process_entry(entry, mirror))).await;

            let mut fatal = None;
            for (entry, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(outcome) => {
                        if outcome == ItemOutcome::RateLimited {
                            report.rate_limited = true;
                        }
                        report.items.push((entry.identity(), outcome));
                    }
                    Err(e) => {
                        tracing::error!(identity = %entry.identity(), error = %e, "fatal error while refreshing");
                        fatal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = fatal {
                return Err(e);
            }

            if report.rate_limited {
                let done = (round + 1) * round_size;
                tracing::warn!(
                    source = %kind,
                    skipped = entries.len().saturating_sub(done),
                    "source rate limited, abandoning its remaining rounds"
                );
                break;
            }
        }

        Ok(report)
    }

    async fn process_entry(
        &self,
        entry: &CatalogEntry,
        mirror: &Mutex<MirrorState>,
    ) -> Result<ItemOutcome> {
        let identity = entry.identity();

        let version = match self.manager.latest_version(entry).await {
            Ok(version) => version,
            Err(e) => return classify(&identity, e),
        };

        let mirrored = mirror
            .lock()
            .await
            .mirrored_version(&identity)
            .map(str::to_string);
        let up_to_date = mirrored.as_deref() == Some(version.as_str());

        if up_to_date && self.manager.resolve_path(entry).await?.is_some() {
            tracing::debug!(identity = %identity, version = %version, "already up to date");
            return Ok(ItemOutcome::UpToDate);
        }

        let outcome = match self.manager.fetch_version(entry, &version).await {
            Ok(outcome) => outcome,
            Err(e) => return classify(&identity, e),
        };
        let Some(path) = outcome.path else {
            tracing::info!(identity = %identity, version = %version, "no artifact available");
            return Ok(ItemOutcome::Unavailable);
        };

        // Same version already on the mirror: the local copy was restored only
        if up_to_date {
            return Ok(ItemOutcome::Refreshed {
                version,
                uploaded: false,
            });
        }

        self.publish(entry, &version, path, mirror).await?;
        Ok(ItemOutcome::Refreshed {
            version,
            uploaded: true,
        })
    }

    /// Upload a new artifact and apply the retention policy of its item
    async fn publish(
        &self,
        entry: &CatalogEntry,
        version: &str,
        path: PathBuf,
        mirror: &Mutex<MirrorState>,
    ) -> Result<()> {
        let identity = entry.identity();
        let mut links = self.uploader.upload(&[path], &entry.name, version).await?;
        let links = links.remove(&entry.name).unwrap_or_default();

        let doomed = {
            let mut state = mirror.lock().await;
            state.set_mirrored_version(&identity, version);
            if state.push_version(&entry.name, version) {
                state.set_latest_links(&entry.name, links);
                state.trim_history(&entry.name, self.config.mirror.retain_count)
            } else {
                state.add_latest_links(&entry.name, links);
                None
            }
        };

        tracing::info!(
            identity = %identity,
            version = %version,
            uploader = self.uploader.name(),
            "published new version"
        );

        if let Some(old) = doomed {
            let file_version = self.manager.adapter_for(entry)?.file_version(&old);
            tracing::info!(name = %entry.name, version = %old, "removing old version from mirror");
            self.uploader.delete_version(&entry.name, &file_version).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("manager", &self.manager)
            .field("uploader", &self.uploader.name())
            .finish()
    }
}

/// Map an adapter or cache error to an item outcome, or pass it on as fatal
fn classify(identity: &Identity, error: crate::Error) -> Result<ItemOutcome> {
    if error.is_rate_limited() {
        tracing::warn!(identity = %identity, error = %error, "rate limited");
        Ok(ItemOutcome::RateLimited)
    } else if error.is_item_level() {
        tracing::warn!(identity = %identity, error = %error, "skipping item");
        Ok(ItemOutcome::Skipped(error.to_string()))
    } else {
        Err(error)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
