//! Per-request diagnostics and debug headers.
//!
//! The pipeline fills a [`Diagnostics`] record as it goes. When debug mode
//! is active for the current environment, the selected fields are written
//! to response headers under the configured prefix (`debug-options`,
//! `debug-strategy`, ...). Otherwise the record is dropped.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DEBUG_PREFIX;
use crate::pipeline::ImageResponse;
use crate::strategy::StrategyAttempt;

/// Diagnostic fields that can be exposed as headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugField {
    Url,
    Options,
    CachePolicy,
    ClientHints,
    Strategy,
    Attempts,
    ProcessingTime,
    Route,
    ResponseCache,
    Error,
}

impl DebugField {
    pub const ALL: [DebugField; 10] = [
        DebugField::Url,
        DebugField::Options,
        DebugField::CachePolicy,
        DebugField::ClientHints,
        DebugField::Strategy,
        DebugField::Attempts,
        DebugField::ProcessingTime,
        DebugField::Route,
        DebugField::ResponseCache,
        DebugField::Error,
    ];

    pub fn header_suffix(&self) -> &'static str {
        match self {
            DebugField::Url => "url",
            DebugField::Options => "options",
            DebugField::CachePolicy => "cache-policy",
            DebugField::ClientHints => "client-hints",
            DebugField::Strategy => "strategy",
            DebugField::Attempts => "attempts",
            DebugField::ProcessingTime => "processing-time",
            DebugField::Route => "route",
            DebugField::ResponseCache => "response-cache",
            DebugField::Error => "error",
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_DEBUG_PREFIX.to_string()
}

fn default_fields() -> Vec<DebugField> {
    DebugField::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_fields")]
    pub include: Vec<DebugField>,
    /// Environments where headers are emitted; empty means all
    #[serde(default)]
    pub environments: Vec<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_prefix(),
            include: default_fields(),
            environments: Vec::new(),
        }
    }
}

impl DebugConfig {
    pub fn is_active(&self, environment: &str) -> bool {
        self.enabled
            && (self.environments.is_empty()
                || self
                    .environments
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(environment)))
    }

    pub fn validate(&self) -> Result<(), String> {
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            return Err("debug.prefix cannot be empty".to_string());
        }
        if !prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(format!(
                "debug.prefix '{}' is not a valid header name prefix",
                self.prefix
            ));
        }
        Ok(())
    }
}

/// What happened while serving one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub original_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_hints: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub attempts: Vec<StrategyAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_cache: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Diagnostics {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Default::default()
        }
    }

    fn value_for(&self, field: DebugField) -> Option<String> {
        match field {
            DebugField::Url => Some(self.original_url.clone()),
            DebugField::Options => self.options.clone(),
            DebugField::CachePolicy => self.cache_policy.clone(),
            DebugField::ClientHints => self.client_hints.clone(),
            DebugField::Strategy => self.strategy.clone(),
            DebugField::Attempts => (!self.attempts.is_empty()).then(|| {
                self.attempts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            }),
            DebugField::ProcessingTime => self.processing_time_ms.map(|ms| format!("{}ms", ms)),
            DebugField::Route => self.route.clone(),
            DebugField::ResponseCache => self.response_cache.map(str::to_string),
            DebugField::Error => self.error.clone(),
        }
    }

    /// Write the configured fields as `{prefix}{field}` headers
    pub fn apply_headers(&self, response: &mut ImageResponse, config: &DebugConfig) {
        for field in &config.include {
            if let Some(value) = self.value_for(*field) {
                let name = format!("{}{}", config.prefix, field.header_suffix());
                response.set_header(&name.to_ascii_lowercase(), &sanitize(&value));
            }
        }
    }
}

/// Keep header values to visible ASCII
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect()
}
