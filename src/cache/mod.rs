// Cache module - per-content-class cache policy and the Cache-Control
// header derived from it. The in-process store of transformed responses
// lives in `response_cache`.

pub mod response_cache;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use response_cache::{ResponseCache, ResponseCacheConfig};

/// TTLs in seconds by response status class; zero means "do not cache"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default)]
    pub ok: u64,
    #[serde(default)]
    pub redirects: u64,
    #[serde(default)]
    pub client_error: u64,
    #[serde(default)]
    pub server_error: u64,
}

fn default_cacheability() -> bool {
    true
}

/// One cache class as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheClassConfig {
    pub name: String,
    /// Matched against the full request URL
    pub regex: String,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default = "default_cacheability")]
    pub cacheability: bool,
    /// Origin-proxy compression hint (e.g. `lossless`, `lossy`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_compression: Option<String>,
    #[serde(default)]
    pub mirage: bool,
}

/// Cache policy resolved for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Name of the matched class, `None` when nothing matched
    pub class: Option<String>,
    pub ttl: TtlConfig,
    pub cacheability: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_compression: Option<String>,
    pub mirage: bool,
}

impl CacheConfig {
    /// Policy used when no class matches: nothing is cached
    pub fn disabled() -> Self {
        Self::default()
    }

    /// TTL for a status code, `None` for informational codes
    pub fn ttl_for_status(&self, status: u16) -> Option<u64> {
        match status / 100 {
            2 => Some(self.ttl.ok),
            3 => Some(self.ttl.redirects),
            4 => Some(self.ttl.client_error),
            5 => Some(self.ttl.server_error),
            _ => None,
        }
    }

    /// Short label for logs and debug headers
    pub fn describe(&self) -> String {
        match &self.class {
            Some(class) if self.cacheability => format!("{} (ttl.ok={}s)", class, self.ttl.ok),
            Some(class) => format!("{} (not cacheable)", class),
            None => "none".to_string(),
        }
    }
}

impl From<&CacheClassConfig> for CacheConfig {
    fn from(class: &CacheClassConfig) -> Self {
        Self {
            class: Some(class.name.clone()),
            ttl: class.ttl,
            cacheability: class.cacheability,
            image_compression: class.image_compression.clone(),
            mirage: class.mirage,
        }
    }
}

/// `Cache-Control` value for a response, or `None` when no header applies
pub fn cache_control_for(status: u16, config: &CacheConfig) -> Option<String> {
    if !config.cacheability {
        return None;
    }
    match config.ttl_for_status(status) {
        Some(ttl) if ttl > 0 => Some(format!("public, max-age={}", ttl)),
        _ => None,
    }
}

/// Validate cache classes: unique names, non-empty compilable regexes
pub fn validate_cache_classes(classes: &[CacheClassConfig]) -> Result<(), String> {
    let mut names = HashSet::new();
    for class in classes {
        if class.name.trim().is_empty() {
            return Err("Cache class name cannot be empty".to_string());
        }
        if !names.insert(class.name.as_str()) {
            return Err(format!("Duplicate cache class name '{}'", class.name));
        }
        if class.regex.is_empty() {
            return Err(format!("Cache class '{}' has an empty regex", class.name));
        }
        Regex::new(&class.regex)
            .map_err(|e| format!("Cache class '{}' has an invalid regex: {}", class.name, e))?;
    }
    Ok(())
}

/// Matches URLs against the configured cache classes, first match wins
pub struct CachePolicyResolver {
    classes: Vec<(Regex, CacheConfig)>,
}

impl CachePolicyResolver {
    pub fn new(classes: &[CacheClassConfig]) -> Result<Self, String> {
        validate_cache_classes(classes)?;
        let classes = classes
            .iter()
            .map(|class| {
                Regex::new(&class.regex)
                    .map(|re| (re, CacheConfig::from(class)))
                    .map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { classes })
    }

    pub fn resolve_cache_config(&self, url: &str) -> CacheConfig {
        self.classes
            .iter()
            .find(|(re, _)| re.is_match(url))
            .map(|(_, config)| config.clone())
            .unwrap_or_else(CacheConfig::disabled)
    }
}
