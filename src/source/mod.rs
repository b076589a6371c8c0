//! Source adapters
//!
//! One [`SourceAdapter`] per upstream kind turns a [`CatalogEntry`] into a
//! version string and a download URL. Adapters never touch the Cache Store;
//! the [`crate::cache::CacheManager`] drives them and owns persistence.
//!
//! ## Submodules
//!
//! - [`github`]: release lookup through the GitHub REST API
//! - [`fdroid`]: version scraping of F-Droid package pages
//! - [`static_link`]: fixed download links versioned by date
//! - [`probe`]: `HEAD` link validation
//! - [`template`]: download URL templates

use crate::config::FetchConfig;
use crate::db::CatalogEntry;
use crate::types::SourceKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod fdroid;
pub mod github;
pub mod probe;
pub mod static_link;
pub mod template;

pub use fdroid::FdroidAdapter;
pub use github::GithubAdapter;
pub use probe::LinkProbe;
pub use static_link::StaticLinkAdapter;

/// Upstream-specific version resolution and URL construction
///
/// Implementations are stateless with respect to the cache: the same entry may
/// be resolved concurrently from the batch orchestrator and from an on-demand
/// lookup.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source kind this adapter serves
    fn kind(&self) -> SourceKind;

    /// Resolve the newest upstream version of an entry
    ///
    /// # Errors
    ///
    /// - [`Error::RateLimited`] when the upstream refuses further requests
    /// - [`Error::NotFound`] when no matching release exists
    /// - [`Error::Network`] for transport failures that survived retries
    async fn latest_version(&self, entry: &CatalogEntry) -> Result<String>;

    /// Build the download URL of an entry for a resolved version
    fn format_url(&self, entry: &CatalogEntry, version: &str) -> Result<String>;

    /// Probe a download URL; any failure or unexpected status is `false`
    async fn is_valid_url(&self, url: &str) -> bool;

    /// Version string safe for use in a file name
    fn file_version(&self, version: &str) -> String {
        version.replace("%2F", "-")
    }
}

/// Adapters keyed by the source kind they serve
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; adapters are added with [`AdapterRegistry::register`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three built-in adapters
    pub fn from_config(fetch: &FetchConfig) -> Result<Self> {
        let probe = LinkProbe::new(fetch)?;
        let client = build_client(fetch)?;

        let mut registry = Self::new();
        registry.register(Arc::new(GithubAdapter::new(
            client.clone(),
            probe.clone(),
            fetch,
        )));
        registry.register(Arc::new(FdroidAdapter::new(client, probe.clone(), fetch)));
        registry.register(Arc::new(StaticLinkAdapter::new(probe)));
        Ok(registry)
    }

    /// Add an adapter, replacing any previous one for the same kind
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Adapter for a source kind
    pub fn get(&self, kind: SourceKind) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnknownSource(kind.to_string()))
    }

    /// Registered source kinds
    pub fn kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// HTTP client for version lookups and downloads
///
/// Follows redirects (release assets are served from a CDN behind a 302) and
/// carries the configured user agent. Per-request timeouts are set by callers.
pub(crate) fn build_client(fetch: &FetchConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(fetch.user_agent.clone())
        .connect_timeout(fetch.request_timeout)
        .build()
        .map_err(|e| Error::Other(format!("failed to build HTTP client: {}", e)))
}

/// Response body excerpt for log and error messages
pub(crate) fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
