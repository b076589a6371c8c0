//! Catalog document loading and expansion
//!
//! The catalog is a YAML or JSON map from item name to an item definition.
//! Each definition expands into one [`CatalogEntry`] per normalized
//! `(platform, architecture)` pair, following source-specific rules:
//!
//! - `github`: cross product of `system` × `architecture`
//! - `fdroid`: one entry per architecture, platform `android`, suffix `.apk`
//! - `only1link`: one entry per declared link in `multi`

use crate::config::{CatalogDefaults, SourceEndpoints};
use crate::db::CatalogEntry;
use crate::error::{Error, Result};
use crate::types::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Parsed catalog document, ordered by item name
pub type Catalog = BTreeMap<String, ItemDefinition>;

/// One static link variant of an `only1link` item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkVariant {
    /// Normalized platform
    pub system: String,
    /// Normalized architecture
    pub architecture: String,
    /// File suffix including the leading dot (e.g. ".exe")
    #[serde(default)]
    pub suffix: String,
    /// Direct download link
    pub downlink: String,
}

/// Raw item definition as written in the catalog document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Source kind handling this item
    pub website: SourceKind,

    /// Upstream project (`owner/repo` on GitHub, package id on F-Droid)
    #[serde(default)]
    pub project_name: String,

    /// Download URL template (GitHub only)
    #[serde(default)]
    pub sample_url: String,

    /// Normalized platform → (upstream system name, suffix)
    #[serde(default)]
    pub system: BTreeMap<String, (String, String)>,

    /// Normalized architecture → upstream architecture name
    #[serde(default)]
    pub architecture: BTreeMap<String, String>,

    /// Static link variants (`only1link` only)
    #[serde(default)]
    pub multi: Vec<LinkVariant>,

    /// Catalog page category
    #[serde(default)]
    pub category: Option<String>,

    /// Catalog page image
    #[serde(default)]
    pub image: Option<String>,

    /// Homepage for sources without a derivable one
    #[serde(default)]
    pub website_url: Option<String>,

    /// Minimum age in days before a cached artifact is checked again
    #[serde(default, rename = "staleDurationDay")]
    pub stale_duration_days: Option<u32>,

    /// F-Droid package published as a single universal APK
    #[serde(default, rename = "4in1")]
    pub single_variant: bool,
}

/// Read a catalog document, choosing the format by file extension
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read catalog '{}': {}", path.display(), e),
        ))
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        other => Err(Error::config(
            format!("unknown catalog format: {:?}", other),
            "catalog_path",
        )),
    }
}

/// Expand every item of a catalog into its entries
pub fn expand_catalog(
    catalog: &Catalog,
    endpoints: &SourceEndpoints,
    defaults: &CatalogDefaults,
) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    for (name, item) in catalog {
        entries.extend(expand_item(name, item, endpoints, defaults)?);
    }
    Ok(entries)
}

/// Expand one item definition into one entry per `(platform, arch)` pair
pub fn expand_item(
    name: &str,
    item: &ItemDefinition,
    endpoints: &SourceEndpoints,
    defaults: &CatalogDefaults,
) -> Result<Vec<CatalogEntry>> {
    let invalid = |reason: &str| Error::InvalidCatalog {
        item: name.to_string(),
        reason: reason.to_string(),
    };

    // (platform, arch, original platform, original arch, suffix, url template)
    let variants: Vec<(String, String, String, String, String, String)> = match item.website {
        SourceKind::Github => {
            if item.project_name.is_empty() || item.sample_url.is_empty() {
                return Err(invalid("github items need project_name and sample_url"));
            }
            if item.system.is_empty() || item.architecture.is_empty() {
                return Err(invalid("github items need system and architecture maps"));
            }
            item.system
                .iter()
                .flat_map(|(platform, (system, suffix))| {
                    item.architecture.iter().map(move |(arch, original_arch)| {
                        (
                            platform.clone(),
                            arch.clone(),
                            system.clone(),
                            original_arch.clone(),
                            suffix.clone(),
                            item.sample_url.clone(),
                        )
                    })
                })
                .collect()
        }
        SourceKind::Fdroid => {
            if item.project_name.is_empty() || item.architecture.is_empty() {
                return Err(invalid("fdroid items need project_name and architecture"));
            }
            item.architecture
                .iter()
                .map(|(arch, original_arch)| {
                    (
                        "android".to_string(),
                        arch.clone(),
                        String::new(),
                        original_arch.clone(),
                        ".apk".to_string(),
                        String::new(),
                    )
                })
                .collect()
        }
        SourceKind::StaticLink => {
            if item.multi.is_empty() {
                return Err(invalid("only1link items need at least one multi entry"));
            }
            item.multi
                .iter()
                .map(|link| {
                    (
                        link.system.clone(),
                        link.architecture.clone(),
                        link.system.clone(),
                        link.architecture.clone(),
                        link.suffix.clone(),
                        link.downlink.clone(),
                    )
                })
                .collect()
        }
    };

    let homepage = homepage_for(item, endpoints, defaults);
    let category = item
        .category
        .clone()
        .unwrap_or_else(|| defaults.category.clone());
    let image = item.image.clone().unwrap_or_else(|| defaults.image.clone());

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(variants.len());
    for (platform, arch, original_platform, original_arch, suffix, url_template) in variants {
        if !seen.insert((platform.clone(), arch.clone())) {
            return Err(invalid(&format!("duplicate variant {}/{}", platform, arch)));
        }
        entries.push(CatalogEntry {
            download_path: format!("/download/?name={}&platform={}&arch={}", name, platform, arch),
            name: name.to_string(),
            category: category.clone(),
            image: image.clone(),
            website: item.website,
            project_name: item.project_name.clone(),
            homepage: homepage.clone(),
            url_template,
            platform,
            arch,
            original_platform,
            original_arch,
            suffix,
            stale_duration_days: item.stale_duration_days.map(i64::from),
            single_variant: item.single_variant,
        });
    }
    Ok(entries)
}

fn homepage_for(item: &ItemDefinition, endpoints: &SourceEndpoints, defaults: &CatalogDefaults) -> String {
    match item.website {
        SourceKind::Github => format!(
            "{}/{}",
            endpoints.github.trim_end_matches('/'),
            item.project_name
        ),
        SourceKind::Fdroid => format!(
            "{}/packages/{}/",
            endpoints.fdroid.trim_end_matches('/'),
            item.project_name
        ),
        SourceKind::StaticLink => item
            .website_url
            .clone()
            .unwrap_or_else(|| defaults.website.clone()),
    }
}
