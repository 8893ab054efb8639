//! Strategy chain
//!
//! Candidates are the registered strategies that the route enables and that
//! accept the request. Strategies named in the route's priority list run
//! first in that order; the rest follow by their own priority. Execution is
//! sequential and stops at the first 2xx/3xx response.

use super::{
    AttemptOutcome, BuiltinStrategy, StrategyAttempt, TransformationStrategy,
    TransformationStrategyParams,
};
use crate::config::StrategyConfig;
use crate::error::ImageServiceError;
use crate::pipeline::ImageResponse;

/// Successful chain run
#[derive(Debug)]
pub struct ChainOutcome {
    pub response: ImageResponse,
    /// Name of the strategy that produced the response
    pub strategy: String,
    /// Every attempt in order, the successful one last
    pub attempts: Vec<StrategyAttempt>,
}

pub struct StrategyChain<S = BuiltinStrategy> {
    strategies: Vec<S>,
}

impl<S: TransformationStrategy> StrategyChain<S> {
    pub fn new(mut strategies: Vec<S>) -> Self {
        // stable: equal priorities keep registration order
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Ordered candidates for a request
    pub fn plan(&self, params: &TransformationStrategyParams, route: &StrategyConfig) -> Vec<&S> {
        let mut candidates: Vec<&S> = self
            .strategies
            .iter()
            .filter(|s| route.is_enabled(s.name()) && s.can_handle(params))
            .collect();

        let mut ordered = Vec::with_capacity(candidates.len());
        for kind in &route.priority {
            if let Some(pos) = candidates.iter().position(|s| s.name() == kind.as_str()) {
                ordered.push(candidates.remove(pos));
            }
        }
        ordered.extend(candidates);
        ordered
    }

    /// Run candidates until one succeeds
    pub async fn execute(
        &self,
        params: &TransformationStrategyParams,
        route: &StrategyConfig,
    ) -> Result<ChainOutcome, ImageServiceError> {
        let plan = self.plan(params, route);
        let mut attempts = Vec::with_capacity(plan.len());

        if plan.is_empty() {
            tracing::error!(key = %params.key, "No applicable transformation strategy");
        }

        for strategy in plan {
            match strategy.execute(params).await {
                Ok(response) if response.is_success() => {
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        outcome: AttemptOutcome::Succeeded {
                            status: response.status.as_u16(),
                        },
                    });
                    tracing::debug!(
                        key = %params.key,
                        strategy = strategy.name(),
                        status = response.status.as_u16(),
                        "Strategy succeeded"
                    );
                    return Ok(ChainOutcome {
                        response,
                        strategy: strategy.name().to_string(),
                        attempts,
                    });
                }
                Ok(response) => {
                    let reason = format!("status {}", response.status.as_u16());
                    tracing::warn!(
                        key = %params.key,
                        strategy = strategy.name(),
                        reason = %reason,
                        "Strategy failed"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        outcome: AttemptOutcome::Failed { reason },
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        key = %params.key,
                        strategy = strategy.name(),
                        error = %e,
                        "Strategy failed"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        outcome: AttemptOutcome::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        if !attempts.is_empty() {
            tracing::error!(
                key = %params.key,
                attempts = attempts.len(),
                "All transformation strategies failed"
            );
        }
        Err(ImageServiceError::StrategiesExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::params;
    use crate::strategy::StrategyKind;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Status(StatusCode),
        Error,
    }

    struct FakeStrategy {
        name: &'static str,
        priority: u32,
        applicable: bool,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        fn new(name: &'static str, priority: u32, behavior: Behavior) -> Self {
            Self {
                name,
                priority,
                applicable: true,
                behavior,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TransformationStrategy for FakeStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn can_handle(&self, _params: &TransformationStrategyParams) -> bool {
            self.applicable
        }

        async fn execute(
            &self,
            _params: &TransformationStrategyParams,
        ) -> Result<ImageResponse, ImageServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Status(status) => Ok(ImageResponse::new(status, Bytes::new())),
                Behavior::Error => Err(ImageServiceError::Timeout("slow origin".to_string())),
            }
        }
    }

    fn names<S: TransformationStrategy>(plan: &[&S]) -> Vec<String> {
        plan.iter().map(|s| s.name().to_string()).collect()
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_success() {
        let a = FakeStrategy::new("a", 0, Behavior::Status(StatusCode::BAD_GATEWAY));
        let b = FakeStrategy::new("b", 1, Behavior::Status(StatusCode::OK));
        let c = FakeStrategy::new("c", 2, Behavior::Status(StatusCode::OK));
        let c_calls = c.calls.clone();

        let chain = StrategyChain::new(vec![c, b, a]);
        let outcome = chain
            .execute(&params("https://images.example.com/cat.jpg"), &StrategyConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.strategy, "b");
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].succeeded());
        assert!(outcome.attempts[1].succeeded());
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_redirect_counts_as_success() {
        let chain = StrategyChain::new(vec![FakeStrategy::new(
            "a",
            0,
            Behavior::Status(StatusCode::FOUND),
        )]);
        let outcome = chain
            .execute(&params("https://images.example.com/cat.jpg"), &StrategyConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.response.status, StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated() {
        let chain = StrategyChain::new(vec![
            FakeStrategy::new("a", 0, Behavior::Status(StatusCode::INTERNAL_SERVER_ERROR)),
            FakeStrategy::new("b", 1, Behavior::Error),
            FakeStrategy::new("c", 2, Behavior::Status(StatusCode::NOT_FOUND)),
        ]);
        let err = chain
            .execute(&params("https://images.example.com/cat.jpg"), &StrategyConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "STRATEGIES_EXHAUSTED");
        match err {
            ImageServiceError::StrategiesExhausted { attempts } => {
                assert_eq!(attempts.len(), 3);
                assert_eq!(attempts[0].to_string(), "a: status 500");
                assert!(attempts[1].to_string().contains("slow origin"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plan_orders_by_route_priority_then_declared() {
        let chain = StrategyChain::new(vec![
            FakeStrategy::new("interceptor", 0, Behavior::Error),
            FakeStrategy::new("direct-url", 10, Behavior::Error),
            FakeStrategy::new("remote-fallback", 20, Behavior::Error),
            FakeStrategy::new("direct-serving", 30, Behavior::Error),
        ]);
        let route = StrategyConfig {
            enabled: None,
            disabled: vec![StrategyKind::Interceptor],
            priority: vec![StrategyKind::DirectServing, StrategyKind::RemoteFallback],
        };

        let p = params("https://images.example.com/cat.jpg");
        assert_eq!(
            names(&chain.plan(&p, &route)),
            vec!["direct-serving", "remote-fallback", "direct-url"]
        );
    }

    #[test]
    fn test_plan_skips_inapplicable_and_not_enabled() {
        let mut skipped = FakeStrategy::new("direct-url", 10, Behavior::Error);
        skipped.applicable = false;
        let chain = StrategyChain::new(vec![
            FakeStrategy::new("interceptor", 0, Behavior::Error),
            skipped,
            FakeStrategy::new("direct-serving", 30, Behavior::Error),
        ]);
        let route = StrategyConfig {
            enabled: Some(vec![StrategyKind::DirectUrl, StrategyKind::DirectServing]),
            ..Default::default()
        };

        let p = params("https://images.example.com/cat.jpg");
        assert_eq!(names(&chain.plan(&p, &route)), vec!["direct-serving"]);
    }

    #[tokio::test]
    async fn test_no_candidates_is_exhausted() {
        let chain: StrategyChain<FakeStrategy> = StrategyChain::new(vec![]);
        let err = chain
            .execute(&params("https://images.example.com/cat.jpg"), &StrategyConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no applicable strategy"));
    }
}
