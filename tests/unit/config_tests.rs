// Configuration loading and validation tests

use std::io::Write;
use tempfile::NamedTempFile;

use kagami::config::{Config, OriginMode};
use kagami::strategy::StrategyKind;

use super::common::{HYBRID_CONFIG, STORAGE_CONFIG};

#[test]
fn test_fixture_configs_validate() {
    for yaml in [STORAGE_CONFIG, HYBRID_CONFIG] {
        let config = Config::from_yaml_with_env(yaml).expect("Failed to parse config");
        assert!(config.validate().is_ok());
    }
}

#[test]
fn test_config_loads_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(HYBRID_CONFIG.as_bytes()).unwrap();
    file.flush().unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.origin.mode, OriginMode::Hybrid);
    assert_eq!(config.strategies.disabled, vec![StrategyKind::DirectServing]);
    assert_eq!(config.cache[0].ttl.ok, 3600);
}

#[test]
fn test_missing_file_is_an_error() {
    let err = Config::from_file("/nonexistent/kagami.yaml").unwrap_err();
    assert!(err.contains("Failed to read config file"));
}

#[test]
fn test_config_deserialization_fails_with_empty_file() {
    assert!(Config::from_yaml_with_env("").is_err());
}

#[test]
fn test_duplicate_route_patterns_rejected() {
    let yaml = format!(
        "{}routes:\n  - pattern: \"*.example.com\"\n  - pattern: \"*.EXAMPLE.com\"\n",
        STORAGE_CONFIG
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    assert!(config.validate().unwrap_err().contains("Duplicate route pattern"));
}

#[test]
fn test_invalid_cache_regex_rejected() {
    let yaml = STORAGE_CONFIG.replace(
        r"regex: '\.(jpe?g|png|gif|webp|avif)(\?.*)?$'",
        "regex: '(unclosed'",
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    assert!(config.validate().unwrap_err().contains("invalid regex"));
}

#[test]
fn test_non_http_resizing_endpoint_rejected() {
    let yaml = STORAGE_CONFIG.replace("https://resizer.example.net", "resizer.example.net");
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    assert!(config.validate().unwrap_err().contains("resizing.endpoint"));
}

#[test]
fn test_route_derivative_must_exist() {
    let yaml = format!(
        "{}routes:\n  - pattern: thumbs.example.com\n    derivative: banner\n",
        STORAGE_CONFIG
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    assert!(config.validate().unwrap_err().contains("unknown derivative"));
}

#[test]
fn test_unknown_fields_in_derivative_rejected() {
    let yaml = STORAGE_CONFIG.replace("    fit: scale-down\n", "    fit: scale-down\n    blur: 3\n");
    assert!(Config::from_yaml_with_env(&yaml).is_err());
}
