// Direct URL strategy - transform the already-resolved public origin URL
// without a storage round trip through this service.

use std::sync::Arc;

use super::{StrategyEnv, TransformationStrategyParams};
use crate::error::ImageServiceError;
use crate::options::TransformDirective;
use crate::pipeline::ImageResponse;

pub struct DirectUrlStrategy {
    env: Arc<StrategyEnv>,
}

impl DirectUrlStrategy {
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }

    pub fn can_handle(&self, params: &TransformationStrategyParams) -> bool {
        params.origin_url.is_some() && params.options.has_transformations()
    }

    pub async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError> {
        let origin_url = params.origin_url.as_deref().ok_or_else(|| {
            ImageServiceError::Configuration("direct-url requires an origin URL".to_string())
        })?;
        let directive = TransformDirective::try_from(&params.options)?;
        let request = self
            .env
            .resizing
            .build_request(origin_url, &directive, &params.cache)?;

        tracing::debug!(key = %params.key, source = %origin_url, "Direct URL transform requested");

        Ok(self.env.fetcher.fetch(request).await?)
    }
}
