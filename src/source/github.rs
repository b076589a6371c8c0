//! GitHub release lookup.

use super::template::{TemplateVars, render_url};
use super::{LinkProbe, SourceAdapter, truncate_body};
use crate::config::{FetchConfig, RetryConfig};
use crate::db::CatalogEntry;
use crate::retry::fetch_with_retry;
use crate::types::SourceKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Status GitHub answers a valid release asset with (redirect to the CDN)
const VALID_ASSET_STATUS: &[u16] = &[302];

/// Resolves versions from the latest GitHub release of a project
#[derive(Clone, Debug)]
pub struct GithubAdapter {
    client: reqwest::Client,
    probe: LinkProbe,
    api_base: String,
    web_base: String,
    token: Option<String>,
    api_version: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl GithubAdapter {
    /// Create the adapter from the fetch settings
    pub fn new(client: reqwest::Client, probe: LinkProbe, fetch: &FetchConfig) -> Self {
        Self {
            client,
            probe,
            api_base: fetch.endpoints.github_api.trim_end_matches('/').to_string(),
            web_base: fetch.endpoints.github.trim_end_matches('/').to_string(),
            token: fetch.github_token.clone(),
            api_version: fetch.github_api_version.clone(),
            timeout: fetch.request_timeout,
            retry: fetch.retry.clone(),
        }
    }

    async fn fetch_latest_tag(&self, project: &str) -> Result<String> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, project);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", &self.api_version);
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }

        let response = request.send().await?;
        let status = response.status();

        // 5xx is transient and goes back to the retry loop
        let response = if status.is_server_error() {
            response.error_for_status()?
        } else {
            response
        };
        let body = response.text().await?;

        let data: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            Error::Other(format!(
                "unexpected response from {} ({}): {}: {}",
                url,
                status,
                e,
                truncate_body(&body)
            ))
        })?;

        if let Some(tag) = data.get("tag_name").and_then(|t| t.as_str()) {
            return Ok(tag.replace('/', "%2F"));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("no release for {}", project)));
        }

        // GitHub reports quota exhaustion as a bare `message`, sometimes with 200
        if let Some(message) = data.get("message").and_then(|m| m.as_str()) {
            tracing::warn!(project = %project, status = %status, message = %message, "GitHub API refused request");
            return Err(Error::RateLimited {
                site: SourceKind::Github.to_string(),
            });
        }

        Err(Error::Other(format!(
            "release of {} has no tag_name: {}",
            project,
            truncate_body(&body)
        )))
    }

    fn expand_template(&self, entry: &CatalogEntry) -> String {
        match entry.url_template.strip_prefix('~') {
            Some(rest) => format!(
                "{}/{}/releases/download{}",
                self.web_base, entry.project_name, rest
            ),
            None => entry.url_template.clone(),
        }
    }
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Github
    }

    async fn latest_version(&self, entry: &CatalogEntry) -> Result<String> {
        let project = &entry.project_name;
        let tag = fetch_with_retry(&self.retry, self.timeout, project, || {
            self.fetch_latest_tag(project)
        })
        .await?;
        tracing::debug!(project = %entry.project_name, tag = %tag, "resolved latest release");
        Ok(tag)
    }

    fn format_url(&self, entry: &CatalogEntry, version: &str) -> Result<String> {
        let template = self.expand_template(entry);
        render_url(
            &template,
            &TemplateVars {
                tag: version,
                system: &entry.original_platform,
                arch: &entry.original_arch,
                suffix: &entry.suffix,
            },
        )
    }

    async fn is_valid_url(&self, url: &str) -> bool {
        self.probe.check(url, VALID_ASSET_STATUS).await
    }
}
