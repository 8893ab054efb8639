// Configuration module

pub mod origin;
pub mod routes;
pub mod server;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::cache::{validate_cache_classes, CacheClassConfig, ResponseCacheConfig};
use crate::constants::{
    DEFAULT_ENVIRONMENT, DEFAULT_PLATFORM_DOMAINS, MAX_QUALITY, MIN_QUALITY,
    PRODUCTION_ENVIRONMENT,
};
use crate::diagnostics::DebugConfig;
use crate::logging::LoggingConfig;
use crate::options::resolver::DefaultOptions;
use crate::options::TransformOptions;
use crate::responsive::ResponsiveConfig;
use crate::strategy::ResizingConfig;

pub use origin::{OriginConfig, OriginMode, PathTransform, RemoteConfig, StorageConfig};
pub use routes::{validate_routes, RouteConfig, StrategyConfig, StrategyOverride};
pub use server::ServerConfig;

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_platform_domains() -> Vec<String> {
    DEFAULT_PLATFORM_DOMAINS
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    /// Deployment environment (`development`, `staging`, `production`)
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub origin: OriginConfig,
    pub resizing: ResizingConfig,
    /// Host suffixes owned by the hosting platform; anything else is a custom domain
    #[serde(default = "default_platform_domains")]
    pub platform_domains: Vec<String>,
    #[serde(default)]
    pub defaults: DefaultOptions,
    #[serde(default)]
    pub derivatives: HashMap<String, TransformOptions>,
    /// Path segment → derivative name
    #[serde(default)]
    pub path_derivatives: BTreeMap<String, String>,
    #[serde(default)]
    pub responsive: ResponsiveConfig,
    /// Cache classes, matched in declaration order
    #[serde(default)]
    pub cache: Vec<CacheClassConfig>,
    #[serde(default)]
    pub response_cache: ResponseCacheConfig,
    #[serde(default)]
    pub strategies: StrategyConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        let mut values = HashMap::new();
        for caps in re.captures_iter(yaml) {
            let var_name = caps[1].to_string();
            let value = std::env::var(&var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
            values.insert(var_name, value);
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION_ENVIRONMENT)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;

        if self.environment.trim().is_empty() {
            return Err("environment cannot be empty".to_string());
        }

        self.logging.validate()?;
        self.origin.validate()?;
        self.resizing.validate()?;
        self.defaults.validate()?;
        self.responsive.validate()?;
        validate_cache_classes(&self.cache)?;
        self.response_cache.validate()?;
        validate_routes(&self.routes)?;
        self.debug.validate()?;

        if self.platform_domains.iter().any(|d| d.trim().is_empty()) {
            return Err("platform_domains cannot contain empty entries".to_string());
        }

        for (name, template) in &self.derivatives {
            if name.trim().is_empty() {
                return Err("Derivative name cannot be empty".to_string());
            }
            if let Some(quality) = template.quality {
                if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
                    return Err(format!(
                        "Derivative '{}' has quality {} outside {}-{}",
                        name, quality, MIN_QUALITY, MAX_QUALITY
                    ));
                }
            }
            if template.height == Some(0) {
                return Err(format!("Derivative '{}' has height 0", name));
            }
        }

        for (segment, derivative) in &self.path_derivatives {
            if !self.derivatives.contains_key(derivative) {
                return Err(format!(
                    "Path derivative '{}' points at unknown derivative '{}'",
                    segment, derivative
                ));
            }
        }

        for route in &self.routes {
            if let Some(derivative) = &route.derivative {
                if !self.derivatives.contains_key(derivative) {
                    return Err(format!(
                        "Route '{}' points at unknown derivative '{}'",
                        route.pattern, derivative
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Fit, Width};
    use crate::strategy::{DirectiveMode, StrategyKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
server:
  address: "127.0.0.1"
  port: 8080
origin:
  storage:
    bucket: "images"
resizing:
  endpoint: "https://resizer.example.net"
"#;

    const FULL: &str = r#"
server:
  address: "0.0.0.0"
  port: 8080
environment: staging
origin:
  mode: hybrid
  storage:
    bucket: "images"
    region: "eu-west-1"
    public_url: "https://bucket.example.org"
  remote:
    base_url: "https://legacy.example.org"
  path_transforms:
    thumbnails:
      remove_prefix: true
resizing:
  endpoint: "https://resizer.example.net"
  mode: metadata
derivatives:
  thumbnail:
    width: 320
    height: 150
    quality: 85
    fit: scale-down
  hero:
    width: auto
path_derivatives:
  thumbnails: thumbnail
cache:
  - name: image
    regex: '\.(jpe?g|png|webp|avif)(\?.*)?$'
    ttl:
      ok: 31536000
      client_error: 60
strategies:
  priority: [interceptor, direct-url]
routes:
  - pattern: "*.example.com"
    strategies:
      disabled: [interceptor]
debug:
  enabled: true
  environments: [development, staging]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml_with_env(MINIMAL).unwrap();
        assert_eq!(config.environment, "development");
        assert_eq!(config.origin.mode, OriginMode::Storage);
        assert_eq!(config.platform_domains, vec!["workers.dev".to_string()]);
        assert_eq!(config.resizing.mode, DirectiveMode::Url);
        assert!(config.cache.is_empty());
        assert!(!config.debug.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml_with_env(FULL).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.origin.mode, OriginMode::Hybrid);
        assert_eq!(config.resizing.mode, DirectiveMode::Metadata);
        let thumbnail = &config.derivatives["thumbnail"];
        assert_eq!(thumbnail.width, Some(Width::Pixels(320)));
        assert_eq!(thumbnail.fit, Some(Fit::ScaleDown));
        assert_eq!(config.derivatives["hero"].width, Some(Width::Auto));
        assert_eq!(config.cache[0].ttl.ok, 31_536_000);
        assert_eq!(
            config.strategies.priority,
            vec![StrategyKind::Interceptor, StrategyKind::DirectUrl]
        );
        assert!(config.debug.is_active(&config.environment));
        assert!(!config.is_production());
    }

    #[test]
    fn test_config_can_be_loaded_from_file_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.origin.storage.unwrap().bucket, "images");
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("KAGAMI_TEST_BUCKET", "from-env");
        let yaml = MINIMAL.replace("\"images\"", "\"${KAGAMI_TEST_BUCKET}\"");
        let config = Config::from_yaml_with_env(&yaml).unwrap();
        assert_eq!(config.origin.storage.unwrap().bucket, "from-env");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let yaml = MINIMAL.replace("\"images\"", "\"${KAGAMI_TEST_UNSET_VARIABLE}\"");
        let err = Config::from_yaml_with_env(&yaml).unwrap_err();
        assert!(err.contains("KAGAMI_TEST_UNSET_VARIABLE"));
    }

    #[test]
    fn test_unknown_path_derivative_rejected() {
        let yaml = format!("{}path_derivatives:\n  thumbnails: thumbnail\n", MINIMAL);
        let config = Config::from_yaml_with_env(&yaml).unwrap();
        assert!(config.validate().unwrap_err().contains("unknown derivative"));
    }

    #[test]
    fn test_bad_derivative_quality_rejected() {
        let yaml = format!("{}derivatives:\n  tiny:\n    quality: 0\n", MINIMAL);
        let config = Config::from_yaml_with_env(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_width_derivative_rejected() {
        let yaml = format!("{}derivatives:\n  flat:\n    width: 0\n", MINIMAL);
        assert!(Config::from_yaml_with_env(&yaml).is_err());
    }

    #[test]
    fn test_misspelled_section_rejected_at_parse() {
        let yaml = format!("{}responsiv:\n  breakpoints: [320]\n", MINIMAL);
        let err = Config::from_yaml_with_env(&yaml).unwrap_err();
        assert!(err.contains("responsiv"));
    }

    #[test]
    fn test_unknown_strategy_rejected_at_parse() {
        let yaml = format!("{}strategies:\n  enabled: [teleport]\n", MINIMAL);
        assert!(Config::from_yaml_with_env(&yaml).is_err());
    }

    #[test]
    fn test_remote_mode_requires_remote_section() {
        let yaml = MINIMAL.replace("origin:\n", "origin:\n  mode: remote\n");
        let config = Config::from_yaml_with_env(&yaml).unwrap();
        assert!(config.validate().unwrap_err().contains("origin.remote"));
    }
}
