//! `HEAD` link validation.

use crate::config::FetchConfig;
use crate::{Error, Result};
use std::time::Duration;

/// Validates download links with a `HEAD` request
///
/// Redirects are not followed: GitHub answers a valid release asset with a
/// `302` to its CDN and an invalid one with `404`, so the first status is the
/// one that matters.
#[derive(Clone, Debug)]
pub struct LinkProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl LinkProbe {
    /// Build a probe using the request timeout and user agent of `fetch`
    pub fn new(fetch: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(fetch.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Other(format!("failed to build probe client: {}", e)))?;

        Ok(Self {
            client,
            timeout: fetch.request_timeout,
        })
    }

    /// `true` when the link answers with one of the `accepted` status codes
    ///
    /// Timeouts and transport errors count as an invalid link.
    pub async fn check(&self, url: &str, accepted: &[u16]) -> bool {
        let request = self.client.head(url).timeout(self.timeout).send();

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                let valid = accepted.contains(&status);
                tracing::debug!(url = %url, status, valid, "probed download link");
                valid
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "download link probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(url = %url, timeout = ?self.timeout, "download link probe timed out");
                false
            }
        }
    }
}
