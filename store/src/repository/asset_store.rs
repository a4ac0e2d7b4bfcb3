//! Asset Stores
//!
//! Object storage backends for files referenced by records.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;

use super::rest_store::{authorize, check_response, RestConfig};
use super::traits::AssetStore;
use crate::domain::{DomainError, DomainResult};

/// Characters escaped inside one path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Assets stored as files under `root/<bucket>/<path>`
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path, refusing anything that escapes the root
    fn resolve(&self, bucket: &str, path: &str) -> DomainResult<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(DomainError::InvalidInput(format!("Unsafe asset path: {}/{}", bucket, path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn delete_asset(&self, bucket: &str, path: &str) -> DomainResult<()> {
        let file = self.resolve(bucket, path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::NotFound(format!("Asset {} not found", file.display())))
            }
            Err(e) => Err(DomainError::Internal(format!("Failed to remove {}: {}", file.display(), e))),
        }
    }
}

/// Hosted object storage (`/storage/v1/object/<bucket>/<path>`)
pub struct RestAssetStore {
    client: Client,
    config: RestConfig,
}

impl RestAssetStore {
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> DomainResult<String> {
        let segments: Vec<&str> = std::iter::once(bucket)
            .chain(path.split('/').filter(|s| !s.is_empty()))
            .collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(DomainError::InvalidInput(format!(
                "asset path {}/{} leaves the bucket",
                bucket, path
            )));
        }
        let encoded: Vec<String> = segments
            .into_iter()
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect();
        Ok(format!("{}/storage/v1/object/{}", self.config.base_url, encoded.join("/")))
    }
}

#[async_trait]
impl AssetStore for RestAssetStore {
    async fn delete_asset(&self, bucket: &str, path: &str) -> DomainResult<()> {
        let url = self.object_url(bucket, path)?;
        let response = authorize(self.client.delete(&url), &self.config).send().await?;
        check_response(response, "asset delete").await?;
        Ok(())
    }
}
