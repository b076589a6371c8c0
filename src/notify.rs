//! Notification sink for fatal batch errors
//!
//! Reports go to an RSS-post endpoint as a one-element JSON array. Reporting
//! never fails: delivery problems are logged and swallowed so they cannot mask
//! the error being reported.

use crate::config::RssSinkConfig;
use async_trait::async_trait;
use serde::Serialize;

/// Receives reports about failed batch runs
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a report; never fails
    async fn report(&self, title: &str, body: &str);
}

/// One entry posted to the RSS sink
#[derive(Debug, Serialize)]
struct RssEntry<'a> {
    title: &'a str,
    link: String,
    summary: &'a str,
    content: &'a str,
    pub_time: f64,
}

/// Posts reports to an RSS-post endpoint with HTTP basic auth
#[derive(Clone, Debug)]
pub struct RssNotifier {
    client: reqwest::Client,
    config: RssSinkConfig,
}

impl RssNotifier {
    /// Create a notifier for the given sink
    pub fn new(config: RssSinkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for RssNotifier {
    async fn report(&self, title: &str, body: &str) {
        let now = chrono::Utc::now();
        let pub_time = now.timestamp_micros() as f64 / 1_000_000.0;
        // Links must be unique per entry
        let entry = RssEntry {
            title,
            link: format!("{}{}", self.config.link_base, pub_time),
            summary: body,
            content: body,
            pub_time,
        };

        let request = self
            .client
            .post(&self.config.endpoint)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("accept", "application/json")
            .json(&[entry])
            .timeout(self.config.timeout);

        let url = &self.config.endpoint;
        match tokio::time::timeout(self.config.timeout, request.send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(url = %url, title = %title, "report delivered");
            }
            Ok(Ok(response)) => {
                tracing::warn!(url = %url, status = %response.status(), "report rejected by RSS sink");
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "failed to deliver report");
            }
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.config.timeout, "report timed out");
            }
        }
    }
}

/// Notifier that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn report(&self, title: &str, body: &str) {
        tracing::error!(title = %title, body = %body, "batch error (no notifier configured)");
    }
}
