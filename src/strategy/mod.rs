//! Transformation strategies
//!
//! A strategy is one way of getting a transformed image for a request:
//!
//! | name              | applies when                                      |
//! |-------------------|---------------------------------------------------|
//! | `interceptor`     | storage origin on a custom domain                 |
//! | `direct-url`      | a public origin URL is known                      |
//! | `remote-fallback` | a remote fallback URL is configured               |
//! | `direct-serving`  | storage origin; serves the original untouched     |
//!
//! The set is closed: [`BuiltinStrategy`] enumerates it and configuration
//! only selects and orders its members. [`StrategyChain`] runs candidates
//! one after another until one succeeds.

pub mod chain;
pub mod direct_serving;
pub mod direct_url;
pub mod interceptor;
pub mod remote_fallback;
pub mod resizing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::cache::CacheConfig;
use crate::error::ImageServiceError;
use crate::fetch::HttpFetcher;
use crate::options::TransformOptions;
use crate::pipeline::{ImageRequest, ImageResponse};
use crate::storage::{ObjectStore, StoredObject};

pub use chain::{ChainOutcome, StrategyChain};
pub use direct_serving::DirectServingStrategy;
pub use direct_url::DirectUrlStrategy;
pub use interceptor::InterceptorStrategy;
pub use remote_fallback::RemoteFallbackStrategy;
pub use resizing::{DirectiveMode, ResizingClient, ResizingConfig};

/// Names of the built-in strategies as used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Interceptor,
    DirectUrl,
    RemoteFallback,
    DirectServing,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Interceptor,
        StrategyKind::DirectUrl,
        StrategyKind::RemoteFallback,
        StrategyKind::DirectServing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Interceptor => "interceptor",
            StrategyKind::DirectUrl => "direct-url",
            StrategyKind::RemoteFallback => "remote-fallback",
            StrategyKind::DirectServing => "direct-serving",
        }
    }

    /// Declared priority, lower runs first
    pub fn default_priority(&self) -> u32 {
        match self {
            StrategyKind::Interceptor => 0,
            StrategyKind::DirectUrl => 10,
            StrategyKind::RemoteFallback => 20,
            StrategyKind::DirectServing => 30,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a strategy needs to handle one request
#[derive(Clone)]
pub struct TransformationStrategyParams {
    /// Storage key (or remote path) of the original image
    pub key: String,
    pub storage: Option<Arc<dyn ObjectStore>>,
    /// Original already read from storage by the pipeline
    pub object: Option<StoredObject>,
    /// Public URL of the original, when one is known
    pub origin_url: Option<String>,
    pub fallback_url: Option<String>,
    pub options: TransformOptions,
    pub request: ImageRequest,
    pub cache: CacheConfig,
}

impl fmt::Debug for TransformationStrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationStrategyParams")
            .field("key", &self.key)
            .field("storage", &self.storage.is_some())
            .field("object", &self.object.as_ref().map(|o| o.size))
            .field("origin_url", &self.origin_url)
            .field("fallback_url", &self.fallback_url)
            .field("options", &self.options)
            .field("request", &self.request.url())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Succeeded { status: u16 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl StrategyAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Succeeded { status } => write!(f, "{}: ok ({})", self.strategy, status),
            AttemptOutcome::Failed { reason } => write!(f, "{}: {}", self.strategy, reason),
        }
    }
}

#[async_trait]
pub trait TransformationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first when the route gives no explicit order
    fn priority(&self) -> u32;

    fn can_handle(&self, params: &TransformationStrategyParams) -> bool;

    /// Produce a response. Non-success statuses count as failures in the chain.
    async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError>;
}

/// Collaborators shared by the built-in strategies
pub struct StrategyEnv {
    pub fetcher: Arc<dyn HttpFetcher>,
    pub resizing: ResizingClient,
    /// Host suffixes of the hosting platform (not custom domains)
    pub platform_domains: Vec<String>,
}

impl StrategyEnv {
    pub fn is_custom_domain(&self, hostname: &str) -> bool {
        let host = hostname.to_ascii_lowercase();
        !host.is_empty()
            && !self.platform_domains.iter().any(|domain| {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{}", domain))
            })
    }
}

/// The closed set of strategies
pub enum BuiltinStrategy {
    Interceptor(InterceptorStrategy),
    DirectUrl(DirectUrlStrategy),
    RemoteFallback(RemoteFallbackStrategy),
    DirectServing(DirectServingStrategy),
}

impl BuiltinStrategy {
    pub fn new(kind: StrategyKind, env: Arc<StrategyEnv>) -> Self {
        match kind {
            StrategyKind::Interceptor => BuiltinStrategy::Interceptor(InterceptorStrategy::new(env)),
            StrategyKind::DirectUrl => BuiltinStrategy::DirectUrl(DirectUrlStrategy::new(env)),
            StrategyKind::RemoteFallback => {
                BuiltinStrategy::RemoteFallback(RemoteFallbackStrategy::new(env))
            }
            StrategyKind::DirectServing => BuiltinStrategy::DirectServing(DirectServingStrategy),
        }
    }

    /// One instance of every built-in strategy
    pub fn all(env: Arc<StrategyEnv>) -> Vec<BuiltinStrategy> {
        StrategyKind::ALL
            .iter()
            .map(|kind| BuiltinStrategy::new(*kind, env.clone()))
            .collect()
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            BuiltinStrategy::Interceptor(_) => StrategyKind::Interceptor,
            BuiltinStrategy::DirectUrl(_) => StrategyKind::DirectUrl,
            BuiltinStrategy::RemoteFallback(_) => StrategyKind::RemoteFallback,
            BuiltinStrategy::DirectServing(_) => StrategyKind::DirectServing,
        }
    }
}

#[async_trait]
impl TransformationStrategy for BuiltinStrategy {
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn priority(&self) -> u32 {
        self.kind().default_priority()
    }

    fn can_handle(&self, params: &TransformationStrategyParams) -> bool {
        match self {
            BuiltinStrategy::Interceptor(s) => s.can_handle(params),
            BuiltinStrategy::DirectUrl(s) => s.can_handle(params),
            BuiltinStrategy::RemoteFallback(s) => s.can_handle(params),
            BuiltinStrategy::DirectServing(s) => s.can_handle(params),
        }
    }

    async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError> {
        match self {
            BuiltinStrategy::Interceptor(s) => s.execute(params).await,
            BuiltinStrategy::DirectUrl(s) => s.execute(params).await,
            BuiltinStrategy::RemoteFallback(s) => s.execute(params).await,
            BuiltinStrategy::DirectServing(s) => s.execute(params).await,
        }
    }
}
