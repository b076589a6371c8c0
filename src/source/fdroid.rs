//! F-Droid package page scraping.
//!
//! F-Droid publishes one build per ABI under consecutive version codes, e.g.
//! for the same release:
//!
//! ```text
//! 1.8.5 (5058004)  arm64-v8a
//! 1.8.5 (5058003)  armeabi-v7a
//! 1.8.5 (5058002)  x86_64
//! 1.8.5 (5058001)  x86
//! ```
//!
//! The version returned for an entry is the version code of the newest build
//! whose native-code list contains the entry's architecture; it identifies the
//! APK in the repository directly.

use super::{LinkProbe, SourceAdapter, template::ensure_url, truncate_body};
use crate::config::{FetchConfig, RetryConfig};
use crate::db::CatalogEntry;
use crate::retry::fetch_with_retry;
use crate::types::SourceKind;
use crate::{Error, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const VALID_APK_STATUS: &[u16] = &[200];

/// Builds listed per ABI-specific package
const SEARCH_LIMIT: usize = 4;

/// One build listed on a package page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageVersion {
    /// Human-readable version name (e.g. "1.8.5")
    pub name: String,
    /// Version code identifying the APK
    pub code: String,
    /// ABIs the build contains; empty for pure-Java packages
    pub native_code: Vec<String>,
}

/// Resolves versions from `{fdroid}/packages/{project}/`
#[derive(Clone, Debug)]
pub struct FdroidAdapter {
    client: reqwest::Client,
    probe: LinkProbe,
    base: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl FdroidAdapter {
    /// Create the adapter from the fetch settings
    pub fn new(client: reqwest::Client, probe: LinkProbe, fetch: &FetchConfig) -> Self {
        Self {
            client,
            probe,
            base: fetch.endpoints.fdroid.trim_end_matches('/').to_string(),
            timeout: fetch.request_timeout,
            retry: fetch.retry.clone(),
        }
    }

    fn package_url(&self, project: &str) -> String {
        format!("{}/packages/{}/", self.base, project)
    }

    async fn fetch_page(&self, project: &str) -> Result<String> {
        let url = self.package_url(project);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("no F-Droid package {}", project)));
        }
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SourceAdapter for FdroidAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Fdroid
    }

    async fn latest_version(&self, entry: &CatalogEntry) -> Result<String> {
        let project = &entry.project_name;
        let html = fetch_with_retry(&self.retry, self.timeout, project, || self.fetch_page(project))
            .await?;

        let limit = if entry.single_variant { 1 } else { SEARCH_LIMIT };
        let versions = parse_versions(&html, limit)?;
        if versions.is_empty() {
            tracing::warn!(
                project = %entry.project_name,
                page = %truncate_body(&html),
                "no package versions listed"
            );
        }

        let found = select_version(&versions, &entry.original_arch, entry.single_variant)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no {} build of {} among the latest {} versions",
                    entry.original_arch, entry.project_name, limit
                ))
            })?;

        tracing::info!(
            project = %entry.project_name,
            version_name = %found.name,
            version_code = %found.code,
            arch = %entry.original_arch,
            "resolved F-Droid build"
        );
        Ok(found.code.clone())
    }

    fn format_url(&self, entry: &CatalogEntry, version: &str) -> Result<String> {
        let url = format!("{}/repo/{}_{}.apk", self.base, entry.project_name, version);
        ensure_url(&url)?;
        Ok(url)
    }

    async fn is_valid_url(&self, url: &str) -> bool {
        self.probe.check(url, VALID_APK_STATUS).await
    }
}

/// Read the first `limit` builds listed on a package page
pub fn parse_versions(html: &str, limit: usize) -> Result<Vec<PackageVersion>> {
    let selector = |css: &str| {
        Selector::parse(css)
            .map_err(|e| Error::Other(format!("invalid selector '{}': {:?}", css, e)))
    };
    let version_sel = selector("div.package-versions li.package-version")?;
    let anchor_sel = selector("a[name]")?;
    let native_sel = selector("code.package-nativecode")?;

    let document = Html::parse_document(html);
    let versions = document
        .select(&version_sel)
        .take(limit)
        .filter_map(|item| parse_version_item(item, &anchor_sel, &native_sel))
        .collect();

    Ok(versions)
}

fn parse_version_item(
    item: ElementRef<'_>,
    anchor_sel: &Selector,
    native_sel: &Selector,
) -> Option<PackageVersion> {
    // Header anchors: version name then version code; "suggested" marks the recommended build
    let mut names = item
        .select(anchor_sel)
        .filter_map(|a| a.value().attr("name"))
        .filter(|name| *name != "suggested");
    let name = names.next()?.to_string();
    let code = names.next()?.to_string();

    let native_code = item
        .select(native_sel)
        .map(|code| code.text().collect::<String>().trim().to_string())
        .filter(|abi| !abi.is_empty())
        .collect();

    Some(PackageVersion {
        name,
        code,
        native_code,
    })
}

/// First build containing `arch`
///
/// A single-variant package whose build lists no native code matches any
/// architecture.
pub fn select_version<'a>(
    versions: &'a [PackageVersion],
    arch: &str,
    single_variant: bool,
) -> Option<&'a PackageVersion> {
    versions.iter().find(|v| {
        v.native_code.iter().any(|abi| abi == arch) || (single_variant && v.native_code.is_empty())
    })
}
