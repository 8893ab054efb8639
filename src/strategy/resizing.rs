//! Client side of the managed resizing service.
//!
//! Two ways to hand over a directive:
//!
//! - `url`: `GET {endpoint}/cdn-cgi/image/width=320,fit=cover/{source_url}`
//! - `metadata`: `GET {endpoint}` with the JSON directive in one header and
//!   the source URL in another
//!
//! Only metadata mode can carry the cache hints (TTL, polish, mirage).

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_OPTIONS_HEADER, DEFAULT_RESIZING_MARKER,
    DEFAULT_SOURCE_HEADER,
};
use crate::error::ImageServiceError;
use crate::fetch::OutboundRequest;
use crate::options::TransformDirective;

/// URL path segment the resizing service listens on in url mode
pub const URL_MODE_PATH: &str = "cdn-cgi/image";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveMode {
    #[default]
    Url,
    Metadata,
}

fn default_marker() -> String {
    DEFAULT_RESIZING_MARKER.to_string()
}

fn default_options_header() -> String {
    DEFAULT_OPTIONS_HEADER.to_string()
}

fn default_source_header() -> String {
    DEFAULT_SOURCE_HEADER.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizingConfig {
    /// Base URL of the managed resizing service
    pub endpoint: String,
    #[serde(default)]
    pub mode: DirectiveMode,
    /// Token the service puts in `Via` when it calls back for an original
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_options_header")]
    pub options_header: String,
    #[serde(default = "default_source_header")]
    pub source_header: String,
    /// Timeout for every outbound request, seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ResizingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            mode: DirectiveMode::default(),
            marker: default_marker(),
            options_header: default_options_header(),
            source_header: default_source_header(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ResizingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!(
                "resizing.endpoint must start with http:// or https://, got '{}'",
                self.endpoint
            ));
        }
        if self.marker.trim().is_empty() {
            return Err("resizing.marker cannot be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("resizing.timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResizeEnvelope<'a> {
    image: &'a TransformDirective,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_ttl: Option<u64>,
    cache_everything: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    polish: Option<&'a str>,
    mirage: bool,
}

/// Builds outbound requests for the resizing service
#[derive(Debug, Clone)]
pub struct ResizingClient {
    config: ResizingConfig,
}

impl ResizingClient {
    pub fn new(config: ResizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResizingConfig {
        &self.config
    }

    pub fn build_request(
        &self,
        source_url: &str,
        directive: &TransformDirective,
        cache: &CacheConfig,
    ) -> Result<OutboundRequest, ImageServiceError> {
        let endpoint = self.config.endpoint.trim_end_matches('/');

        match self.config.mode {
            DirectiveMode::Url => Ok(OutboundRequest::get(format!(
                "{}/{}/{}/{}",
                endpoint,
                URL_MODE_PATH,
                directive.to_url_options(),
                source_url
            ))),
            DirectiveMode::Metadata => {
                let envelope = ResizeEnvelope {
                    image: directive,
                    cache_ttl: cache
                        .cacheability
                        .then_some(cache.ttl.ok)
                        .filter(|ttl| *ttl > 0),
                    cache_everything: cache.cacheability,
                    polish: cache.image_compression.as_deref(),
                    mirage: cache.mirage,
                };
                let options = serde_json::to_string(&envelope).map_err(|e| {
                    ImageServiceError::Validation(format!("cannot encode resize directive: {}", e))
                })?;

                Ok(OutboundRequest::get(endpoint)
                    .header(&self.config.options_header, &escape_non_ascii(&options))?
                    .header(&self.config.source_header, source_url)?)
            }
        }
    }
}

/// Rewrite non-ASCII characters as `\uXXXX` escapes so JSON fits in a header.
/// Outside string literals JSON is pure ASCII, so this only touches strings.
fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}
