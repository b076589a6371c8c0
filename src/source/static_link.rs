//! Fixed download links without upstream versioning.

use super::{LinkProbe, SourceAdapter, template::ensure_url};
use crate::db::CatalogEntry;
use crate::types::SourceKind;
use crate::Result;
use async_trait::async_trait;

/// Direct links answer 200, links behind a download redirector 302
const VALID_LINK_STATUS: &[u16] = &[200, 302];

/// Serves items published under one unchanging link
///
/// Such upstreams expose no version, so the version is today's local date and
/// the item is fetched again at most once a day.
#[derive(Clone, Debug)]
pub struct StaticLinkAdapter {
    probe: LinkProbe,
}

impl StaticLinkAdapter {
    /// Create the adapter
    pub fn new(probe: LinkProbe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl SourceAdapter for StaticLinkAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::StaticLink
    }

    async fn latest_version(&self, _entry: &CatalogEntry) -> Result<String> {
        Ok(chrono::Local::now().format("%Y-%m-%d").to_string())
    }

    fn format_url(&self, entry: &CatalogEntry, _version: &str) -> Result<String> {
        ensure_url(&entry.url_template)?;
        Ok(entry.url_template.clone())
    }

    async fn is_valid_url(&self, url: &str) -> bool {
        self.probe.check(url, VALID_LINK_STATUS).await
    }
}
