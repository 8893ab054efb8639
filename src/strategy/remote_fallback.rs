// Remote fallback strategy - fetch from the configured remote origin,
// through the resizing service when there is something to transform and
// with a plain GET otherwise.

use std::sync::Arc;

use super::{StrategyEnv, TransformationStrategyParams};
use crate::error::ImageServiceError;
use crate::fetch::OutboundRequest;
use crate::options::TransformDirective;
use crate::pipeline::ImageResponse;

pub struct RemoteFallbackStrategy {
    env: Arc<StrategyEnv>,
}

impl RemoteFallbackStrategy {
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }

    pub fn can_handle(&self, params: &TransformationStrategyParams) -> bool {
        params.fallback_url.is_some()
    }

    pub async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError> {
        let fallback_url = params.fallback_url.as_deref().ok_or_else(|| {
            ImageServiceError::Configuration("remote-fallback requires a fallback URL".to_string())
        })?;

        let request = if params.options.has_transformations() {
            let directive = TransformDirective::try_from(&params.options)?;
            self.env
                .resizing
                .build_request(fallback_url, &directive, &params.cache)?
        } else {
            OutboundRequest::get(fallback_url)
        };

        tracing::debug!(key = %params.key, source = %fallback_url, "Remote fallback requested");

        Ok(self.env.fetcher.fetch(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{StubFetcher, StubReply};
    use crate::options::TransformOptions;
    use crate::strategy::test_support::{env, params, RESIZER};

    const REMOTE: &str = "https://legacy.example.org/images/cat.jpg";

    #[tokio::test]
    async fn test_transform_goes_through_resizer() {
        let fetcher = StubFetcher::new();
        fetcher.on(RESIZER, StubReply::ok("image/webp", b"webp"));
        let strategy = RemoteFallbackStrategy::new(env(fetcher.clone()));

        let mut p = params("https://images.example.com/cat.jpg");
        assert!(!strategy.can_handle(&p));
        p.fallback_url = Some(REMOTE.to_string());
        assert!(strategy.can_handle(&p));

        strategy.execute(&p).await.unwrap();
        assert!(fetcher.urls()[0].starts_with(RESIZER));
        assert!(fetcher.urls()[0].ends_with(REMOTE));
    }

    #[tokio::test]
    async fn test_plain_get_without_transformations() {
        let fetcher = StubFetcher::new();
        fetcher.on(REMOTE, StubReply::ok("image/jpeg", b"jpeg"));
        let strategy = RemoteFallbackStrategy::new(env(fetcher.clone()));

        let mut p = params("https://images.example.com/cat.jpg");
        p.fallback_url = Some(REMOTE.to_string());
        p.options = TransformOptions::default();

        let response = strategy.execute(&p).await.unwrap();
        assert_eq!(response.header("content-type"), Some("image/jpeg"));
        assert_eq!(fetcher.urls(), vec![REMOTE.to_string()]);
    }
}
