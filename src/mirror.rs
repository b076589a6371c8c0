//! Remote mirror bookkeeping
//!
//! [`MirrorState`] tracks what has been pushed to the object store: the
//! version history of every item, the version last uploaded per identity, the
//! pinned versions that must never be deleted and the public links of the
//! newest upload. It is loaded at the start of a batch run, mutated in memory
//! and written back with a single [`MirrorState::flush`] at the end.

use crate::config::MirrorConfig;
use crate::types::Identity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

/// Contents of the version history file
#[derive(Debug, Default, Serialize, Deserialize)]
struct VersionFile {
    /// Item name → versions on the mirror, newest first
    #[serde(default)]
    history: BTreeMap<String, VecDeque<String>>,
    /// `name/platform/arch` → version last uploaded
    #[serde(default)]
    mirrored: BTreeMap<String, String>,
}

/// In-memory mirror state of one batch run
#[derive(Debug)]
pub struct MirrorState {
    version_path: PathBuf,
    latest_link_path: PathBuf,
    versions: VersionFile,
    retained: BTreeMap<String, BTreeSet<String>>,
    latest_links: BTreeMap<String, Vec<String>>,
    dirty: bool,
}

impl MirrorState {
    /// Load the state files from the data directory; missing files are empty
    pub async fn load(config: &MirrorConfig) -> Result<Self> {
        let versions: VersionFile = read_json(&config.version_path()).await?.unwrap_or_default();
        let retained = read_json(&config.retained_version_path())
            .await?
            .unwrap_or_default();
        let latest_links = read_json(&config.latest_link_path())
            .await?
            .unwrap_or_default();

        Ok(Self {
            version_path: config.version_path(),
            latest_link_path: config.latest_link_path(),
            versions,
            retained,
            latest_links,
            dirty: false,
        })
    }

    /// Version last uploaded for an identity
    pub fn mirrored_version(&self, identity: &Identity) -> Option<&str> {
        self.versions
            .mirrored
            .get(&identity.to_string())
            .map(String::as_str)
    }

    /// Record the version uploaded for an identity
    pub fn set_mirrored_version(&mut self, identity: &Identity, version: &str) {
        let previous = self
            .versions
            .mirrored
            .insert(identity.to_string(), version.to_string());
        if previous.as_deref() != Some(version) {
            self.dirty = true;
        }
    }

    /// Versions of an item on the mirror, newest first
    pub fn history(&self, name: &str) -> Vec<String> {
        self.versions
            .history
            .get(name)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `version` of `name` is pinned
    pub fn is_pinned(&self, name: &str, version: &str) -> bool {
        self.retained
            .get(name)
            .is_some_and(|pinned| pinned.contains(version))
    }

    /// Push `version` to the front of the history of `name`
    ///
    /// Returns `false` when it already is the newest entry.
    pub fn push_version(&mut self, name: &str, version: &str) -> bool {
        let history = self.versions.history.entry(name.to_string()).or_default();
        if history.front().is_some_and(|v| v == version) {
            return false;
        }
        history.push_front(version.to_string());
        self.dirty = true;
        true
    }

    /// Trim the history of `name` and return the version to delete, if any
    pub fn trim_history(&mut self, name: &str, retain_count: usize) -> Option<String> {
        let pinned = self.retained.get(name).cloned().unwrap_or_default();
        let history = self.versions.history.get_mut(name)?;
        let before = history.len();
        let doomed = apply_retention(history, retain_count, &pinned);
        if history.len() != before {
            self.dirty = true;
        }
        doomed
    }

    /// Public links of the newest upload of `name`
    pub fn latest_links(&self, name: &str) -> &[String] {
        self.latest_links
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the public links of `name`
    pub fn set_latest_links(&mut self, name: &str, links: Vec<String>) {
        if self.latest_links.get(name) != Some(&links) {
            self.latest_links.insert(name.to_string(), links);
            self.dirty = true;
        }
    }

    /// Append links to those of the newest upload of `name`, skipping known ones
    ///
    /// Used when further variants of the current version are uploaded.
    pub fn add_latest_links(&mut self, name: &str, links: Vec<String>) {
        let current = self.latest_links.entry(name.to_string()).or_default();
        for link in links {
            if !current.contains(&link) {
                current.push(link);
                self.dirty = true;
            }
        }
    }

    /// Whether there are changes not yet written
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write pending changes; a no-op when nothing changed since the last flush
    ///
    /// Returns whether anything was written. Pinned versions are never
    /// written: they are maintained by hand.
    pub async fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        write_json(&self.version_path, &self.versions).await?;
        write_json(&self.latest_link_path, &self.latest_links).await?;
        self.dirty = false;

        tracing::info!(path = %self.version_path.display(), "mirror state flushed");
        Ok(true)
    }
}

/// Apply the retention rule to one history (newest first)
///
/// When the history holds more than `retain_count + 1` versions the oldest is
/// dropped. It is returned for deletion unless it is pinned or equal to the
/// newest version.
pub fn apply_retention(
    history: &mut VecDeque<String>,
    retain_count: usize,
    pinned: &BTreeSet<String>,
) -> Option<String> {
    if history.len() <= retain_count + 1 {
        return None;
    }
    let oldest = history.pop_back()?;

    if pinned.contains(&oldest) {
        tracing::info!(version = %oldest, "oldest version is pinned, keeping it on the mirror");
        return None;
    }
    if history.front() == Some(&oldest) {
        return None;
    }
    Some(oldest)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
            Error::Other(format!("failed to parse {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Write through a temporary file so a crash never leaves a truncated file
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
