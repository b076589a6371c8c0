//! Configuration types for update-fetch

use crate::error::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local artifact cache configuration
///
/// Groups settings for the quota-managed cache directory and the database
/// that indexes it. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached artifacts (default: "./temp_download")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// SQLite database path (default: "./data/uf.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Ceiling for the total size of the cache directory in MiB (default: 1024)
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: u64,

    /// How long an on-demand lookup waits for a refresh before answering
    /// "temporarily unavailable" (default: 30 seconds)
    #[serde(default = "default_on_demand_timeout", with = "duration_serde")]
    pub on_demand_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            database_path: default_database_path(),
            max_cache_size_mb: default_max_cache_size_mb(),
            on_demand_timeout: default_on_demand_timeout(),
        }
    }
}

impl CacheConfig {
    /// Quota ceiling in bytes
    pub fn max_cache_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Base URLs of the upstream sites
///
/// Overridable so tests and private mirrors can point adapters elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceEndpoints {
    /// GitHub REST API root (default: "https://api.github.com")
    #[serde(default = "default_github_api")]
    pub github_api: String,

    /// GitHub web root used for release asset links (default: "https://github.com")
    #[serde(default = "default_github_web")]
    pub github: String,

    /// F-Droid root (default: "https://f-droid.org")
    #[serde(default = "default_fdroid")]
    pub fdroid: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            github_api: default_github_api(),
            github: default_github_web(),
            fdroid: default_fdroid(),
        }
    }
}

/// Upstream fetching behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of items refreshed concurrently against one source (default: 1)
    #[serde(default = "default_concurrent_amount")]
    pub concurrent_amount: usize,

    /// Timeout for version lookups and link probes (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for one complete download attempt of an artifact (default: 600 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// GitHub token sent as `Authorization` header (e.g. "Bearer ghp_...")
    #[serde(default)]
    pub github_token: Option<String>,

    /// Value of the `X-GitHub-Api-Version` header (default: "2022-11-28")
    #[serde(default = "default_github_api_version")]
    pub github_api_version: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upstream base URLs
    #[serde(default)]
    pub endpoints: SourceEndpoints,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrent_amount: default_concurrent_amount(),
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
            github_token: None,
            github_api_version: default_github_api_version(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
            endpoints: SourceEndpoints::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Object storage upload settings for the `mc` client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Path to the `mc` binary (default: "mc", resolved through PATH)
    #[serde(default = "default_client_path")]
    pub client_path: PathBuf,

    /// Alias under which the server was registered with `mc alias set`
    pub host_alias: String,

    /// Bucket receiving the uploads
    pub bucket: String,

    /// Public URL of the object storage server (e.g. "http://10.0.0.2:9000/")
    pub public_base_url: String,
}

/// Remote mirror and version-retention settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory holding the mirror state files (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of older versions kept on the mirror besides the newest (default: 2)
    #[serde(default = "default_retain_count")]
    pub retain_count: usize,

    /// Version history file name (default: "version.json")
    #[serde(default = "default_version_file")]
    pub version_file: String,

    /// Pinned versions file name (default: "retained_version.json")
    #[serde(default = "default_retained_file")]
    pub retained_version_file: String,

    /// Latest public links file name (default: "latest_link.json")
    #[serde(default = "default_latest_link_file")]
    pub latest_link_file: String,

    /// Upload target; `None` keeps artifacts local only
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retain_count: default_retain_count(),
            version_file: default_version_file(),
            retained_version_file: default_retained_file(),
            latest_link_file: default_latest_link_file(),
            upload: None,
        }
    }
}

impl MirrorConfig {
    /// Absolute location of the version history file
    pub fn version_path(&self) -> PathBuf {
        self.data_dir.join(&self.version_file)
    }

    /// Absolute location of the pinned versions file
    pub fn retained_version_path(&self) -> PathBuf {
        self.data_dir.join(&self.retained_version_file)
    }

    /// Absolute location of the latest links file
    pub fn latest_link_path(&self) -> PathBuf {
        self.data_dir.join(&self.latest_link_file)
    }
}

/// RSS-post endpoint used to report fatal batch errors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RssSinkConfig {
    /// URL receiving the POSTed entries
    pub endpoint: String,

    /// Prefix of the per-entry link; a timestamp is appended to keep links unique
    #[serde(default)]
    pub link_base: String,

    /// Basic auth user
    pub username: String,

    /// Basic auth password
    pub password: String,

    /// Timeout for each report (default: 10 seconds)
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Notification configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// RSS sink; `None` disables external reporting
    #[serde(default)]
    pub rss: Option<RssSinkConfig>,
}

/// Values used when a catalog item omits them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogDefaults {
    /// Category for items without one (default: "Uncategorized")
    #[serde(default = "default_category")]
    pub category: String,

    /// Image shown for items without one
    #[serde(default)]
    pub image: String,

    /// Homepage for items whose source has no derivable one (default: "/")
    #[serde(default = "default_website")]
    pub website: String,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            category: default_category(),
            image: String::new(),
            website: default_website(),
        }
    }
}

/// Daily batch schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether the daily run is active (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Local time of the daily run as "HH:MM" (default: "00:03")
    #[serde(default = "default_run_at")]
    pub run_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            run_at: default_run_at(),
        }
    }
}

impl ScheduleConfig {
    /// Parse `run_at` into a time of day
    pub fn run_at_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .map_err(|e| Error::config(format!("invalid run_at '{}': {}", self.run_at, e), "run_at"))
    }
}

/// Main configuration for update-fetch
///
/// Passed explicitly to the cache manager and orchestrator at construction;
/// nothing in the crate reads process-wide configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Catalog document (YAML or JSON), reloaded before every batch run
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Local cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Remote mirror and retention settings
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Error reporting
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Catalog fallbacks
    #[serde(default)]
    pub defaults: CatalogDefaults,

    /// Daily schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            mirror: MirrorConfig::default(),
            notifications: NotificationConfig::default(),
            defaults: CatalogDefaults::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                format!("failed to read {}: {}", path.display(), e),
                "config_file",
            )
        })?;

        let config: Config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            other => {
                return Err(Error::config(
                    format!("unknown config format: {:?}", other),
                    "config_file",
                ));
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrent_amount == 0 {
            return Err(Error::config(
                "concurrent_amount must be at least 1",
                "concurrent_amount",
            ));
        }
        if self.cache.max_cache_size_mb == 0 {
            return Err(Error::config(
                "max_cache_size_mb must be at least 1",
                "max_cache_size_mb",
            ));
        }
        if let Some(upload) = &self.mirror.upload
            && upload.bucket.is_empty()
        {
            return Err(Error::config("bucket must not be empty", "bucket"));
        }
        self.schedule.run_at_time()?;
        Ok(())
    }
}

// Default value functions
fn default_cache_dir() -> PathBuf {
    PathBuf::from("temp_download")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("uf.db")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data").join("items.yaml")
}

fn default_max_cache_size_mb() -> u64 {
    1024
}

fn default_on_demand_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_concurrent_amount() -> usize {
    1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_github_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_user_agent() -> String {
    format!("update-fetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_web() -> String {
    "https://github.com".to_string()
}

fn default_fdroid() -> String {
    "https://f-droid.org".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_client_path() -> PathBuf {
    PathBuf::from("mc")
}

fn default_retain_count() -> usize {
    2
}

fn default_version_file() -> String {
    "version.json".to_string()
}

fn default_retained_file() -> String {
    "retained_version.json".to_string()
}

fn default_latest_link_file() -> String {
    "latest_link.json".to_string()
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_category() -> String {
    "Uncategorized".to_string()
}

fn default_website() -> String {
    "/".to_string()
}

fn default_run_at() -> String {
    "00:03".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
