//! Error types for update-fetch
//!
//! This module provides the error taxonomy shared by every layer of the crate:
//! - Source-level failures (`RateLimited`) that suspend one upstream for a run
//! - Item-level failures (`NotFound`, `Template`, `InvalidLink`) that skip one item
//! - Infrastructure failures (database, I/O, network) that the orchestrator
//!   treats as fatal for the batch

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for update-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for update-fetch
///
/// Adapters raise the typed variants, the cache manager converts probe and
/// download failures into empty outcomes, and the orchestrator decides which
/// variants stop a source, skip an item, or fail the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache_dir")
        key: Option<String>,
    },

    /// Catalog document could not be interpreted
    #[error("invalid catalog item {item}: {reason}")]
    InvalidCatalog {
        /// Name of the offending catalog item
        item: String,
        /// What is wrong with it
        reason: String,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Upstream quota exhausted; the whole source is suspended for this run
    #[error("rate limited by {site}")]
    RateLimited {
        /// Source kind that signalled quota exhaustion (e.g., "github")
        site: String,
    },

    /// No matching upstream resource for one item
    #[error("not found: {0}")]
    NotFound(String),

    /// Link probe rejected a download URL
    #[error("invalid download link: {url}")]
    InvalidLink {
        /// The URL that failed the probe
        url: String,
    },

    /// URL template could not be rendered
    #[error("template error: {0}")]
    Template(String),

    /// Catalog references a source kind with no registered adapter
    #[error("no adapter registered for source {0}")]
    UnknownSource(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cached artifact path is unusable
    #[error("invalid cache path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// External tool execution failed (mc, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the error suspends the whole upstream source for the run
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// True when the error only affects the item being refreshed
    ///
    /// Item-level errors are logged and the item is skipped; everything else
    /// (other than rate limiting) is fatal to the batch.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::InvalidLink { .. } | Error::Template(_)
        )
    }

    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}
