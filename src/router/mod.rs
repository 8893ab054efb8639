// Router module - picks the route configuration for a request host
//
// Most specific match wins: an exact host beats any wildcard, a longer
// `*.suffix` beats a shorter one, and `*` only applies when nothing else
// does. Without a matching route the global strategy settings apply.

use crate::config::{RouteConfig, StrategyConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    /// `*.example.com`, stored as `.example.com`
    Suffix(String),
    Any,
}

impl HostPattern {
    fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            HostPattern::Any
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            HostPattern::Suffix(suffix.to_string())
        } else {
            HostPattern::Exact(pattern)
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(exact) => host == exact,
            HostPattern::Suffix(suffix) => host.len() > suffix.len() && host.ends_with(suffix),
            HostPattern::Any => true,
        }
    }

    /// Higher is more specific
    fn specificity(&self) -> (u8, usize) {
        match self {
            HostPattern::Exact(exact) => (2, exact.len()),
            HostPattern::Suffix(suffix) => (1, suffix.len()),
            HostPattern::Any => (0, 0),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    host: HostPattern,
    config: RouteConfig,
}

/// Route lookup result
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute<'a> {
    /// Pattern of the matched route, `None` for the global defaults
    pub pattern: Option<&'a str>,
    /// Effective strategy settings after applying the route override
    pub strategies: StrategyConfig,
    pub derivative: Option<&'a str>,
}

pub struct Router {
    routes: Vec<CompiledRoute>,
    global: StrategyConfig,
}

impl Router {
    pub fn new(routes: &[RouteConfig], global: StrategyConfig) -> Self {
        let routes = routes
            .iter()
            .map(|config| CompiledRoute {
                host: HostPattern::parse(&config.pattern),
                config: config.clone(),
            })
            .collect();
        Router { routes, global }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Resolve the route for a hostname (no port)
    pub fn resolve(&self, host: &str) -> ResolvedRoute<'_> {
        let host = host.to_ascii_lowercase();

        // max_by_key keeps the last maximum; iterate in reverse so the
        // first declared route wins among equals
        let matched = self
            .routes
            .iter()
            .rev()
            .filter(|route| route.host.matches(&host))
            .max_by_key(|route| route.host.specificity());

        match matched {
            Some(route) => ResolvedRoute {
                pattern: Some(route.config.pattern.as_str()),
                strategies: match &route.config.strategies {
                    Some(overrides) => self.global.overlay(overrides),
                    None => self.global.clone(),
                },
                derivative: route.config.derivative.as_deref(),
            },
            None => ResolvedRoute {
                pattern: None,
                strategies: self.global.clone(),
                derivative: None,
            },
        }
    }
}
