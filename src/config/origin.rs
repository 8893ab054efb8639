//! Origin configuration: where original images come from.
//!
//! - `storage`: an S3-compatible bucket. Missing keys are a 404.
//! - `remote`: a plain HTTP origin. No storage lookup at all.
//! - `hybrid`: storage first, the remote origin when the key is missing.
//!
//! Path transforms rewrite the request path before it becomes a storage key
//! or a remote URL, keyed by the first path segment:
//!
//! ```yaml
//! path_transforms:
//!   thumbnails:
//!     remove_prefix: true
//!     prefix: "images/"
//! ```
//!
//! turns `/thumbnails/cat.jpg` into `images/cat.jpg`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginMode {
    #[default]
    Storage,
    Remote,
    Hybrid,
}

impl OriginMode {
    pub fn uses_storage(&self) -> bool {
        matches!(self, OriginMode::Storage | OriginMode::Hybrid)
    }

    pub fn uses_remote(&self) -> bool {
        matches!(self, OriginMode::Remote | OriginMode::Hybrid)
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (MinIO, R2, LocalStack)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Public base URL of the bucket, used by the direct-url strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Base URL for the remote-fallback strategy; defaults to `base_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathTransform {
    #[serde(default)]
    pub remove_prefix: bool,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OriginConfig {
    #[serde(default)]
    pub mode: OriginMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub path_transforms: BTreeMap<String, PathTransform>,
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl OriginConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.mode.uses_storage() {
            let storage = self.storage.as_ref().ok_or_else(|| {
                format!(
                    "origin.mode '{}' requires an origin.storage section",
                    self.mode_name()
                )
            })?;
            if storage.bucket.trim().is_empty() {
                return Err("origin.storage.bucket cannot be empty".to_string());
            }
            if storage.access_key.is_some() != storage.secret_key.is_some() {
                return Err(
                    "origin.storage.access_key and secret_key must be set together".to_string(),
                );
            }
            if let Some(url) = &storage.public_url {
                if !is_http_url(url) {
                    return Err(format!(
                        "origin.storage.public_url must be an http(s) URL, got '{}'",
                        url
                    ));
                }
            }
        }

        if self.mode.uses_remote() {
            let remote = self.remote.as_ref().ok_or_else(|| {
                format!(
                    "origin.mode '{}' requires an origin.remote section",
                    self.mode_name()
                )
            })?;
            for url in std::iter::once(&remote.base_url).chain(remote.fallback_url.iter()) {
                if !is_http_url(url) {
                    return Err(format!(
                        "origin.remote URLs must be http(s) URLs, got '{}'",
                        url
                    ));
                }
            }
        }

        for segment in self.path_transforms.keys() {
            if segment.is_empty() || segment.contains('/') {
                return Err(format!(
                    "origin.path_transforms key '{}' must be a single path segment",
                    segment
                ));
            }
        }
        Ok(())
    }

    fn mode_name(&self) -> &'static str {
        match self.mode {
            OriginMode::Storage => "storage",
            OriginMode::Remote => "remote",
            OriginMode::Hybrid => "hybrid",
        }
    }

    /// Request path after path transforms, without a leading slash and
    /// still percent-encoded
    pub fn transform_path(&self, path: &str) -> String {
        let trimmed = path.trim_start_matches('/');
        let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

        match self.path_transforms.get(first) {
            Some(transform) if !rest.is_empty() => {
                let remaining = if transform.remove_prefix {
                    rest.to_string()
                } else {
                    trimmed.to_string()
                };
                format!("{}{}", transform.prefix.trim_start_matches('/'), remaining)
            }
            _ => trimmed.to_string(),
        }
    }

    /// Storage key for a request path (percent-decoded)
    pub fn storage_key(&self, path: &str) -> String {
        let transformed = self.transform_path(path);
        urlencoding::decode(&transformed)
            .map(|k| k.into_owned())
            .unwrap_or(transformed)
    }

    /// Public URL of the original for the direct-url strategy
    pub fn origin_url(&self, path: &str) -> Option<String> {
        let transformed = self.transform_path(path);
        let storage_url = self
            .storage
            .as_ref()
            .filter(|_| self.mode.uses_storage())
            .and_then(|s| s.public_url.as_deref());
        let remote_url = self
            .remote
            .as_ref()
            .filter(|_| self.mode.uses_remote())
            .map(|r| r.base_url.as_str());

        storage_url
            .or(remote_url)
            .map(|base| join_url(base, &transformed))
    }

    /// URL for the remote-fallback strategy
    pub fn fallback_url(&self, path: &str) -> Option<String> {
        if !self.mode.uses_remote() {
            return None;
        }
        let remote = self.remote.as_ref()?;
        let base = remote.fallback_url.as_deref().unwrap_or(&remote.base_url);
        Some(join_url(base, &self.transform_path(path)))
    }
}
