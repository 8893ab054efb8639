//! In-process cache of transformed responses.
//!
//! Backed by a `moka` future cache. Each entry lives for the `ttl.ok` of the
//! cache class that admitted it, so entries from different classes expire
//! independently. Keys are SHA-256 digests of the request URL plus the
//! directive actually sent to the resizing service.

use moka::future::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_RESPONSE_CACHE_ENTRIES;
use crate::pipeline::ImageResponse;

fn default_max_entries() -> u64 {
    DEFAULT_RESPONSE_CACHE_ENTRIES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
        }
    }
}

impl ResponseCacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.max_entries == 0 {
            return Err("response_cache.max_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    response: ImageResponse,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct ResponseCache {
    cache: Cache<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Cache key for a request URL and the serialized directive
    pub fn key(url: &str, directive: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(directive.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<ImageResponse> {
        self.cache.get(key).await.map(|entry| entry.response)
    }

    /// Store a response; zero TTLs are ignored
    pub async fn insert(&self, key: String, response: ImageResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.cache
            .insert(key, CachedResponse { response, ttl })
            .await;
    }

    /// Approximate entry count
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn run_pending(&self) {
        self.cache.run_pending_tasks().await;
    }
}
