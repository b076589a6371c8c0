//! # update-fetch
//!
//! Mirror, cache and serve the latest released artifacts of upstream projects.
//!
//! ## Design Philosophy
//!
//! update-fetch is designed to be:
//! - **Catalog-driven** - One YAML document lists every mirrored item
//! - **Source-pluggable** - GitHub releases, F-Droid and static links share one adapter trait
//! - **Crash-safe** - Cache records are auto-committed; mirror state is flushed once per run
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use update_fetch::{BatchOrchestrator, Config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file(Path::new("update-fetch.yaml"))?;
//!     let orchestrator = BatchOrchestrator::from_config(config).await?;
//!
//!     // Refresh every catalog item once
//!     let report = orchestrator.run().await?;
//!     println!("refreshed {} items", report.refreshed_count());
//!
//!     // Serve a file, fetching it on a cache miss
//!     let path = orchestrator
//!         .manager()
//!         .get_file("demo", "linux", "amd64")
//!         .await?;
//!     println!("{:?}", path);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Cache Manager: artifact download, lookup and quota
pub mod cache;
/// Catalog document parsing and expansion
pub mod catalog;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Version history, retention and latest links
pub mod mirror;
/// Failure notifications
pub mod notify;
/// Batch refresh of the whole catalog
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Daily batch schedule
pub mod scheduler;
/// Upstream source adapters
pub mod source;
/// Core types
pub mod types;
/// Object store upload
pub mod upload;


// Re-export commonly used types
pub use cache::CacheManager;
pub use config::{Config, RetryConfig};
pub use db::{CacheRecord, CatalogEntry, Database};
pub use error::{DatabaseError, Error, Result};
pub use mirror::MirrorState;
pub use notify::{NoOpNotifier, Notifier, RssNotifier};
pub use orchestrator::BatchOrchestrator;
pub use source::{AdapterRegistry, SourceAdapter};
pub use types::{BatchReport, CacheRecordId, Identity, ItemOutcome, RefreshOutcome, SourceKind};
pub use upload::{MinioUploader, NoOpUploader, Uploader};

/// Run the daily batch schedule until a termination signal arrives.
///
/// Spawns [`scheduler::run_daily`] and cancels it on shutdown; a batch that is
/// already running is allowed to finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use update_fetch::{BatchOrchestrator, Config, run_with_shutdown};
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::from_file(Path::new("update-fetch.yaml"))?;
///     let run_at = config.schedule.run_at_time()?;
///     let orchestrator = BatchOrchestrator::from_config(config).await?;
///
///     run_with_shutdown(orchestrator, run_at).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    orchestrator: BatchOrchestrator,
    run_at: chrono::NaiveTime,
) -> Result<()> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let schedule = tokio::spawn(scheduler::run_daily(orchestrator, run_at, cancel.clone()));

    wait_for_signal().await;
    cancel.cancel();

    schedule
        .await
        .map_err(|e| Error::Other(format!("schedule task failed: {}", e)))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
