// Interceptor strategy
//
// Asks the resizing service to transform this very request URL. The service
// calls back into us for the original, tagged with the resizing marker in
// `Via`, and the pipeline answers that call straight from storage.

use std::sync::Arc;

use super::{StrategyEnv, TransformationStrategyParams};
use crate::error::ImageServiceError;
use crate::options::TransformDirective;
use crate::pipeline::ImageResponse;

pub struct InterceptorStrategy {
    env: Arc<StrategyEnv>,
}

impl InterceptorStrategy {
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }

    /// Storage-backed, on a custom domain, with something to transform
    pub fn can_handle(&self, params: &TransformationStrategyParams) -> bool {
        params.storage.is_some()
            && params.options.has_transformations()
            && self.env.is_custom_domain(params.request.hostname())
    }

    pub async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError> {
        let directive = TransformDirective::try_from(&params.options)?;
        let source_url = params.request.resource_url();
        let request = self
            .env
            .resizing
            .build_request(&source_url, &directive, &params.cache)?;

        tracing::debug!(
            key = %params.key,
            source = %source_url,
            target = %request.url,
            "Interceptor transform requested"
        );

        Ok(self.env.fetcher.fetch(request).await?)
    }
}
