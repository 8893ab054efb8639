//! Strategy selection and per-domain route configuration.
//!
//! The global `strategies` section sets which transformation strategies may
//! run and in what order. Each entry in `routes` targets a host pattern
//! (`images.example.com`, `*.example.com` or `*`) and may override any of
//! those lists or pin a derivative for every request on that host.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::strategy::StrategyKind;

/// Which strategies are allowed and in what order they are tried
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Allow-list; `None` allows every strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<StrategyKind>>,
    #[serde(default)]
    pub disabled: Vec<StrategyKind>,
    /// Strategies named here run first, in this order
    #[serde(default)]
    pub priority: Vec<StrategyKind>,
}

impl StrategyConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        let allowed = self
            .enabled
            .as_ref()
            .map_or(true, |enabled| enabled.iter().any(|k| k.as_str() == name));
        allowed && !self.disabled.iter().any(|k| k.as_str() == name)
    }

    /// Apply a route override field by field
    pub fn overlay(&self, overrides: &StrategyOverride) -> StrategyConfig {
        StrategyConfig {
            enabled: overrides.enabled.clone().or_else(|| self.enabled.clone()),
            disabled: overrides
                .disabled
                .clone()
                .unwrap_or_else(|| self.disabled.clone()),
            priority: overrides
                .priority
                .clone()
                .unwrap_or_else(|| self.priority.clone()),
        }
    }
}

/// Route-level strategy override; unset fields inherit the global value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<StrategyKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Vec<StrategyKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Vec<StrategyKind>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Host pattern: exact host, `*.suffix` or `*`
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies: Option<StrategyOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative: Option<String>,
}

/// Check route patterns for shape and duplicates
pub fn validate_routes(routes: &[RouteConfig]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for route in routes {
        let pattern = route.pattern.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            return Err("Route pattern cannot be empty".to_string());
        }
        if pattern != "*" && pattern.contains('*') && !pattern.starts_with("*.") {
            return Err(format!(
                "Route pattern '{}' is invalid: wildcards are only allowed as a leading '*.'",
                route.pattern
            ));
        }
        if pattern.matches('*').count() > 1 {
            return Err(format!(
                "Route pattern '{}' has more than one wildcard",
                route.pattern
            ));
        }
        if !seen.insert(pattern) {
            return Err(format!("Duplicate route pattern '{}'", route.pattern));
        }
    }
    Ok(())
}
