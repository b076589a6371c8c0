//! Retry with exponential backoff for upstream requests
//!
//! Release lookups, package pages and artifact downloads go through
//! [`fetch_with_retry`]. Every attempt runs under its own timeout; an attempt
//! that overruns it fails with a transient I/O timeout. Only errors for which
//! [`IsRetryable::is_retryable`] holds are tried again, so rate limiting and
//! missing releases reach the orchestrator on their first occurrence.
//!
//! # Example
//!
//! ```no_run
//! use update_fetch::retry::fetch_with_retry;
//! use update_fetch::config::RetryConfig;
//! use std::time::Duration;
//!
//! # async fn example() -> update_fetch::Result<()> {
//! let config = RetryConfig::default();
//! let tag = fetch_with_retry(&config, Duration::from_secs(30), "acme/demo release", || async {
//!     // e.g. query the latest release of a project
//!     Ok("v1.0".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Classifies failures as transient or permanent
pub trait IsRetryable {
    /// True if the failure is transient and the operation may succeed when repeated
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            Error::ExternalTool(msg) => ["timeout", "busy", "temporary"]
                .iter()
                .any(|hint| msg.contains(hint)),
            // Rate limits, missing releases and everything local are final
            _ => false,
        }
    }
}

/// Delays to wait between the attempts of one operation
///
/// Yields `max_attempts` delays, growing by `backoff_multiplier` up to
/// `max_delay`. With jitter enabled each delay is stretched by a random
/// factor between 1 and 2.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    remaining: u32,
}

impl Backoff {
    /// Delay schedule described by `config`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            remaining: config.max_attempts,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = scale(base, self.multiplier, self.max).min(self.max);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(1.0..=2.0);
            Some(scale(base, factor, base))
        } else {
            Some(base)
        }
    }
}

/// `delay * factor`, or `fallback` when the product is not a valid duration
fn scale(delay: Duration, factor: f64, fallback: Duration) -> Duration {
    let nanos = delay.as_nanos() as f64 * factor;
    if nanos.is_finite() && (0.0..u64::MAX as f64).contains(&nanos) {
        Duration::from_nanos(nanos as u64)
    } else {
        fallback
    }
}

/// Run `operation` until it succeeds, fails permanently or the retries run out
///
/// `context` names what is being fetched (a project, a URL) in the retry
/// logs. Each attempt is bounded by `attempt_timeout`. Permanent failures are
/// returned untouched and unlogged; the caller decides what they mean.
pub async fn fetch_with_retry<F, Fut, T>(
    config: &RetryConfig,
    attempt_timeout: Duration,
    context: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(config);
    let mut attempt: u32 = 1;

    loop {
        let error = match tokio::time::timeout(attempt_timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    tracing::info!(context = %context, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => Error::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("{} took longer than {:?}", context, attempt_timeout),
            )),
        };

        if !error.is_retryable() {
            return Err(error);
        }
        let Some(delay) = backoff.next() else {
            tracing::warn!(context = %context, attempts = attempt, error = %error, "giving up");
            return Err(error);
        };

        tracing::warn!(
            context = %context,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
