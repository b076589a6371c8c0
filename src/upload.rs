//! Upload collaborator
//!
//! The orchestrator hands freshly cached artifacts to an [`Uploader`] and asks
//! it to delete versions that fell out of the retention window.
//! [`MinioUploader`] drives the MinIO `mc` client; [`NoOpUploader`] keeps
//! everything local.

use crate::config::UploadConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Pushes artifacts to remote storage
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `paths` as `version` of `name`
    ///
    /// Returns the public links of the uploaded files keyed by item name.
    async fn upload(
        &self,
        paths: &[PathBuf],
        name: &str,
        version: &str,
    ) -> Result<HashMap<String, Vec<String>>>;

    /// Delete every stored file of `name` whose file name carries `version`
    async fn delete_version(&self, name: &str, version: &str) -> Result<()>;

    /// Uploader name for logs
    fn name(&self) -> &'static str;
}

/// Uploader shelling out to the MinIO client
///
/// Files land in `{alias}/{bucket}/{name}/`; the alias must have been
/// registered beforehand with `mc alias set`.
#[derive(Clone, Debug)]
pub struct MinioUploader {
    binary_path: PathBuf,
    target: String,
    bucket: String,
    public_base_url: String,
}

impl MinioUploader {
    /// Create an uploader with an explicit `mc` binary
    pub fn new(binary_path: PathBuf, config: &UploadConfig) -> Self {
        Self {
            binary_path,
            target: format!(
                "{}/{}",
                config.host_alias.trim_end_matches('/'),
                config.bucket.trim_matches('/')
            ),
            bucket: config.bucket.trim_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create an uploader, locating `client_path` through `PATH`
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        let binary_path = which::which(&config.client_path).map_err(|e| {
            Error::ExternalTool(format!(
                "mc client {} not found: {}",
                config.client_path.display(),
                e
            ))
        })?;
        Ok(Self::new(binary_path, config))
    }

    fn item_target(&self, name: &str) -> String {
        format!("{}/{}", self.target, name)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary_path)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute mc: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "mc {} failed ({}): {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Uploader for MinioUploader {
    async fn upload(
        &self,
        paths: &[PathBuf],
        name: &str,
        version: &str,
    ) -> Result<HashMap<String, Vec<String>>> {
        let target = self.item_target(name);
        self.run(&["mb", "--ignore-existing", &target]).await?;

        let mut links = Vec::with_capacity(paths.len());
        for path in paths {
            let file_name = file_name(path)?;
            let source = path.to_string_lossy();
            self.run(&["cp", source.as_ref(), &format!("{}/", target)])
                .await?;

            tracing::info!(name = %name, version = %version, file = %file_name, "uploaded artifact");
            links.push(format!(
                "{}/{}/{}/{}",
                self.public_base_url, self.bucket, name, file_name
            ));
        }

        Ok(HashMap::from([(name.to_string(), links)]))
    }

    async fn delete_version(&self, name: &str, version: &str) -> Result<()> {
        let target = self.item_target(name);
        let pattern = format!("*{}.*", version);
        let found = self.run(&["find", &target, "--name", &pattern]).await?;

        for object in found.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.run(&["rm", object]).await?;
            tracing::info!(name = %name, version = %version, object = %object, "deleted old version");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "minio"
    }
}

/// Uploader for deployments without remote storage
///
/// Reports `file://` links to the cached artifacts and never deletes anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpUploader;

#[async_trait]
impl Uploader for NoOpUploader {
    async fn upload(
        &self,
        paths: &[PathBuf],
        name: &str,
        version: &str,
    ) -> Result<HashMap<String, Vec<String>>> {
        tracing::debug!(name = %name, version = %version, files = paths.len(), "upload disabled, keeping artifacts local");
        let links = paths
            .iter()
            .map(|p| {
                url::Url::from_file_path(p)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|()| format!("file://{}", p.display()))
            })
            .collect();
        Ok(HashMap::from([(name.to_string(), links)]))
    }

    async fn delete_version(&self, name: &str, version: &str) -> Result<()> {
        tracing::debug!(name = %name, version = %version, "upload disabled, nothing to delete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "no file name".to_string(),
        })
}
