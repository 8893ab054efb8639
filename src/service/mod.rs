//! Image service: the request state machine.
//!
//! ```text
//! request ─┬─ Via carries the resizing marker ──► raw original (re-entry)
//!          └─ key ─► cache policy ─► options ─► route
//!                    ─► response cache ─► storage lookup ─► strategy chain
//!                    ─► Cache-Control / Vary ─► debug headers ─► response
//! ```
//!
//! The re-entry branch is how the interceptor strategy works: the managed
//! resizing service calls back into this same handler for the untransformed
//! original and marks the call with its token in `Via`. That branch must
//! never reach the strategy chain.
//!
//! Every collaborator is built once in [`ImageService::new`] from the
//! validated configuration and is read-only afterwards.

use http::header::{CACHE_CONTROL, VARY, VIA};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{cache_control_for, CacheConfig, CachePolicyResolver, ResponseCache};
use crate::config::{Config, OriginMode};
use crate::constants::REQUEST_ID_HEADER;
use crate::diagnostics::Diagnostics;
use crate::error::ImageServiceError;
use crate::fetch::{HttpFetcher, OutboundRequest};
use crate::metrics::Metrics;
use crate::options::{
    vary_header, DerivativeRegistry, OptionResolver, ResolvedOptions, TransformDirective,
    TransformOptions,
};
use crate::pipeline::{ImageRequest, ImageResponse, RequestContext};
use crate::responsive::ClientSignals;
use crate::router::Router;
use crate::storage::{ObjectStore, StoredObject};
use crate::strategy::direct_serving::object_response;
use crate::strategy::{
    BuiltinStrategy, ResizingClient, StrategyAttempt, StrategyChain, StrategyEnv,
    TransformationStrategyParams,
};

/// I/O collaborators injected into the service
#[derive(Clone)]
pub struct ServiceDeps {
    /// Required for `storage` and `hybrid` origins
    pub storage: Option<Arc<dyn ObjectStore>>,
    pub fetcher: Arc<dyn HttpFetcher>,
}

pub struct ImageService {
    config: Config,
    storage: Option<Arc<dyn ObjectStore>>,
    fetcher: Arc<dyn HttpFetcher>,
    router: Arc<Router>,
    resolver: OptionResolver,
    cache_policy: CachePolicyResolver,
    response_cache: Option<ResponseCache>,
    chain: StrategyChain,
    metrics: Arc<Metrics>,
}

/// Outcome of the storage lookup at the top of the pipeline
enum Original {
    Found(StoredObject),
    /// Missing (or unreadable) in hybrid mode; remote strategies take over
    Missing,
    /// Remote-only origin, storage is never consulted
    NotApplicable,
}

impl ImageService {
    pub fn new(
        config: Config,
        deps: ServiceDeps,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ImageServiceError> {
        if config.origin.mode.uses_storage() && deps.storage.is_none() {
            return Err(ImageServiceError::Configuration(
                "storage origin configured but no object store was provided".to_string(),
            ));
        }

        let router = Arc::new(Router::new(&config.routes, config.strategies.clone()));
        let derivatives = Arc::new(DerivativeRegistry::new(
            config.derivatives.clone(),
            config.path_derivatives.clone(),
        ));
        let resolver = OptionResolver::new(
            derivatives,
            router.clone(),
            config.defaults.clone(),
            config.responsive.clone(),
        );
        let cache_policy =
            CachePolicyResolver::new(&config.cache).map_err(ImageServiceError::Configuration)?;
        let response_cache = config
            .response_cache
            .enabled
            .then(|| ResponseCache::new(&config.response_cache));

        let env = Arc::new(StrategyEnv {
            fetcher: deps.fetcher.clone(),
            resizing: ResizingClient::new(config.resizing.clone()),
            platform_domains: config.platform_domains.clone(),
        });
        let chain = StrategyChain::new(BuiltinStrategy::all(env));

        tracing::info!(
            origin_mode = ?config.origin.mode,
            routes = router.route_count(),
            derivatives = config.derivatives.len(),
            cache_classes = config.cache.len(),
            response_cache = response_cache.is_some(),
            strategies = chain.len(),
            "Image service initialized"
        );

        Ok(Self {
            storage: if config.origin.mode.uses_storage() {
                deps.storage
            } else {
                None
            },
            fetcher: deps.fetcher,
            config,
            router,
            resolver,
            cache_policy,
            response_cache,
            chain,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle one request. Always produces a response; failures become
    /// error responses here.
    pub async fn handle(&self, request: ImageRequest, ctx: &RequestContext) -> ImageResponse {
        self.metrics.increment_request_count();
        let mut diagnostics = Diagnostics::new(request.url());

        let mut response = match self.process(&request, &mut diagnostics).await {
            Ok(response) => response,
            Err(e) => {
                diagnostics.error = Some(e.to_string());
                let status = e.status().as_u16();
                if status >= 500 {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        path = %request.path,
                        status,
                        code = e.code(),
                        error = %e,
                        "Request failed"
                    );
                } else {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        path = %request.path,
                        status,
                        code = e.code(),
                        "Request rejected"
                    );
                }
                e.to_response(!self.config.is_production())
            }
        };

        let elapsed = ctx.elapsed();
        diagnostics.processing_time_ms = Some(elapsed.as_millis());
        if self.config.debug.is_active(&self.config.environment) {
            diagnostics.apply_headers(&mut response, &self.config.debug);
        }
        response.set_header(REQUEST_ID_HEADER, ctx.request_id());

        self.metrics.increment_status_count(response.status.as_u16());
        self.metrics.record_duration(elapsed.as_secs_f64() * 1000.0);

        tracing::info!(
            request_id = %ctx.request_id(),
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            strategy = diagnostics.strategy.as_deref().unwrap_or("-"),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        response
    }

    async fn process(
        &self,
        request: &ImageRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<ImageResponse, ImageServiceError> {
        if request.method != "GET" && request.method != "HEAD" {
            return Err(ImageServiceError::Validation(format!(
                "method {} is not supported",
                request.method
            )));
        }

        let key = self.config.origin.storage_key(&request.path);
        if key.is_empty() {
            return Err(ImageServiceError::Validation(
                "request path does not name an image".to_string(),
            ));
        }

        if self.is_reentrant(request) {
            self.metrics.increment_reentrant_request();
            diagnostics.strategy = Some("re-entry".to_string());
            return self.serve_original(request, &key).await;
        }

        let cache = self.cache_policy.resolve_cache_config(&request.url());
        diagnostics.cache_policy = Some(cache.describe());

        let ResolvedOptions {
            options,
            format_negotiated,
        } = self
            .resolver
            .resolve(request, &request.query, &request.path);
        if options.source.is_none() {
            self.metrics.increment_resolver_fallback();
        }
        diagnostics.options = serde_json::to_string(&options).ok();
        diagnostics.client_hints =
            Some(ClientSignals::from_request(request, &self.config.responsive).summary());

        let route = self.router.resolve(request.hostname());
        diagnostics.route = Some(route.pattern.unwrap_or("default").to_string());

        let cache_key = self.response_cache_key(request, &options, &cache);
        if let (Some(response_cache), Some(cache_key)) = (&self.response_cache, &cache_key) {
            if let Some(hit) = response_cache.get(cache_key).await {
                self.metrics.increment_response_cache_hit();
                diagnostics.response_cache = Some("hit");
                tracing::debug!(key = %key, "Response cache hit");
                return Ok(hit);
            }
            self.metrics.increment_response_cache_miss();
            diagnostics.response_cache = Some("miss");
        }

        let fallback_url = self.config.origin.fallback_url(&request.path);
        let mut params = TransformationStrategyParams {
            key: key.clone(),
            storage: self.storage.clone(),
            object: None,
            origin_url: self.config.origin.origin_url(&request.path),
            fallback_url: fallback_url.clone(),
            options,
            request: request.clone(),
            cache: cache.clone(),
        };

        match self.lookup_original(&key, fallback_url.is_some()).await? {
            Original::Found(object) => params.object = Some(object),
            Original::Missing => {
                // only the remote side can serve this key now
                params.storage = None;
                params.origin_url = None;
            }
            Original::NotApplicable => {}
        }

        let outcome = self
            .chain
            .execute(&params, &route.strategies)
            .await
            .map_err(|e| {
                if let ImageServiceError::StrategiesExhausted { attempts } = &e {
                    self.record_attempts(attempts);
                    diagnostics.attempts = attempts.clone();
                }
                e
            })?;

        self.record_attempts(&outcome.attempts);
        diagnostics.strategy = Some(outcome.strategy.clone());
        diagnostics.attempts = outcome.attempts;

        let mut response = outcome.response;
        apply_cache_headers(&mut response, &cache);
        if format_negotiated {
            response.set_header(VARY.as_str(), vary_header());
        }

        if let (Some(response_cache), Some(cache_key)) = (&self.response_cache, cache_key) {
            if response.status.is_success() && cache.cacheability && cache.ttl.ok > 0 {
                response_cache
                    .insert(
                        cache_key,
                        response.clone(),
                        Duration::from_secs(cache.ttl.ok),
                    )
                    .await;
            }
        }

        Ok(response)
    }

    fn is_reentrant(&self, request: &ImageRequest) -> bool {
        let marker = self.config.resizing.marker.to_ascii_lowercase();
        request
            .headers
            .get_all(VIA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains(&marker))
    }

    /// Answer a callback from the resizing service with the untouched original
    async fn serve_original(
        &self,
        request: &ImageRequest,
        key: &str,
    ) -> Result<ImageResponse, ImageServiceError> {
        if let Some(storage) = &self.storage {
            let object = storage.get(key).await?.ok_or_else(|| {
                ImageServiceError::NotFound(format!("object '{}' not found", key))
            })?;
            tracing::debug!(key = %key, size = object.size, "Serving original to resizing service");
            return Ok(object_response(&object));
        }

        let url = self.config.origin.origin_url(&request.path).ok_or_else(|| {
            ImageServiceError::Configuration("no origin configured for re-entry".to_string())
        })?;
        let response = self.fetcher.fetch(OutboundRequest::get(url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(ImageServiceError::NotFound(format!(
                "object '{}' not found",
                key
            )));
        }
        Ok(response)
    }

    async fn lookup_original(
        &self,
        key: &str,
        has_fallback: bool,
    ) -> Result<Original, ImageServiceError> {
        let storage = match &self.storage {
            Some(storage) => storage,
            None => return Ok(Original::NotApplicable),
        };
        let hybrid = self.config.origin.mode == OriginMode::Hybrid && has_fallback;

        match storage.get(key).await {
            Ok(Some(object)) => Ok(Original::Found(object)),
            Ok(None) if hybrid => {
                tracing::debug!(key = %key, "Object not in storage, trying remote origin");
                Ok(Original::Missing)
            }
            Ok(None) => Err(ImageServiceError::NotFound(format!(
                "object '{}' not found",
                key
            ))),
            Err(e) if hybrid => {
                tracing::warn!(key = %key, error = %e, "Storage lookup failed, trying remote origin");
                Ok(Original::Missing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn response_cache_key(
        &self,
        request: &ImageRequest,
        options: &TransformOptions,
        cache: &CacheConfig,
    ) -> Option<String> {
        if self.response_cache.is_none() || !cache.cacheability || cache.ttl.ok == 0 {
            return None;
        }
        let directive = TransformDirective::try_from(options).ok()?;
        let directive = serde_json::to_string(&directive).ok()?;
        Some(ResponseCache::key(&request.url(), &directive))
    }

    fn record_attempts(&self, attempts: &[StrategyAttempt]) {
        for attempt in attempts {
            if attempt.succeeded() {
                self.metrics.increment_strategy_success(&attempt.strategy);
            } else {
                self.metrics.increment_strategy_failure(&attempt.strategy);
            }
        }
    }
}

/// Replace any upstream `Cache-Control` with the one the cache class dictates
fn apply_cache_headers(response: &mut ImageResponse, cache: &CacheConfig) {
    match cache_control_for(response.status.as_u16(), cache) {
        Some(value) => response.set_header(CACHE_CONTROL.as_str(), &value),
        None => response.remove_header(CACHE_CONTROL.as_str()),
    }
}
