//! Core types for update-fetch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a cache record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheRecordId(pub i64);

impl CacheRecordId {
    /// Create a new CacheRecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for CacheRecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CacheRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for CacheRecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for CacheRecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for CacheRecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Upstream fetch strategy of a catalog item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// GitHub releases API lookup
    Github,
    /// F-Droid package page scraping
    Fdroid,
    /// Fixed download links without upstream versioning
    #[serde(rename = "only1link")]
    StaticLink,
}

impl SourceKind {
    /// Name used in catalog documents and the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Github => "github",
            SourceKind::Fdroid => "fdroid",
            SourceKind::StaticLink => "only1link",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(SourceKind::Github),
            "fdroid" => Ok(SourceKind::Fdroid),
            "only1link" => Ok(SourceKind::StaticLink),
            other => Err(crate::error::Error::UnknownSource(other.to_string())),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for SourceKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SourceKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.as_str().to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SourceKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(text.parse()?)
    }
}

/// Identity of one cached artifact
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Catalog item name
    pub name: String,
    /// Normalized platform (e.g. "linux", "android")
    pub platform: String,
    /// Normalized architecture (e.g. "amd64")
    pub arch: String,
}

impl Identity {
    /// Build an identity from its parts
    pub fn new(name: impl Into<String>, platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            arch: arch.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.platform, self.arch)
    }
}

/// Result of refreshing one catalog entry
///
/// `path` is `None` when no artifact was produced (invalid link, failed
/// download); `version` is the upstream version that was resolved either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Location of the newly cached artifact
    pub path: Option<PathBuf>,
    /// Upstream version resolved for the entry
    pub version: String,
}

impl RefreshOutcome {
    /// Outcome for a refresh that produced no artifact
    pub fn empty(version: impl Into<String>) -> Self {
        Self {
            path: None,
            version: version.into(),
        }
    }

    /// True when a new artifact is available
    pub fn is_fetched(&self) -> bool {
        self.path.is_some()
    }
}

/// What happened to one entry during a batch run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new artifact was cached
    Refreshed {
        /// Version that was downloaded
        version: String,
        /// Whether the artifact was handed to the uploader
        uploaded: bool,
    },
    /// Upstream version already mirrored and cached
    UpToDate,
    /// Version resolved but no artifact could be fetched
    Unavailable,
    /// Item-level failure (no matching resource, bad template)
    Skipped(String),
    /// Upstream signalled quota exhaustion
    RateLimited,
}

/// Summary of a batch run
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// Per-entry outcomes in completion order
    pub items: Vec<(Identity, ItemOutcome)>,
    /// Sources whose remaining rounds were abandoned
    pub rate_limited_sources: Vec<SourceKind>,
}

impl BatchReport {
    /// Outcome recorded for one identity, if it was attempted
    pub fn outcome(&self, identity: &Identity) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, outcome)| outcome)
    }

    /// Number of entries that produced a new artifact
    pub fn refreshed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Refreshed { .. }))
            .count()
    }
}
