// Direct serving strategy - return the stored original unmodified

use http::header::{CONTENT_TYPE, ETAG};
use http::StatusCode;

use super::TransformationStrategyParams;
use crate::error::ImageServiceError;
use crate::pipeline::ImageResponse;
use crate::storage::StoredObject;

pub struct DirectServingStrategy;

impl DirectServingStrategy {
    pub fn can_handle(&self, params: &TransformationStrategyParams) -> bool {
        params.object.is_some() || params.storage.is_some()
    }

    pub async fn execute(
        &self,
        params: &TransformationStrategyParams,
    ) -> Result<ImageResponse, ImageServiceError> {
        let object = match (&params.object, &params.storage) {
            (Some(object), _) => object.clone(),
            (None, Some(storage)) => storage.get(&params.key).await?.ok_or_else(|| {
                ImageServiceError::NotFound(format!("object '{}' not found", params.key))
            })?,
            (None, None) => {
                return Err(ImageServiceError::Configuration(
                    "direct-serving requires a storage origin".to_string(),
                ))
            }
        };

        Ok(object_response(&object))
    }
}

/// 200 response carrying a stored object as-is
pub fn object_response(object: &StoredObject) -> ImageResponse {
    let mut response = ImageResponse::new(StatusCode::OK, object.body.clone());
    response.set_header(CONTENT_TYPE.as_str(), object.content_type_or_default());
    if let Some(etag) = &object.etag {
        response.set_header(ETAG.as_str(), etag);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use crate::strategy::test_support::params;
    use bytes::Bytes;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_serves_prefetched_object() {
        let mut p = params("https://images.example.com/cat.jpg");
        assert!(!DirectServingStrategy.can_handle(&p));

        p.object = Some(StoredObject::new(&b"jpeg"[..], Some("image/jpeg")));
        let response = DirectServingStrategy.execute(&p).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"jpeg"));
        assert_eq!(response.header("content-type"), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_reads_storage_when_not_prefetched() {
        let store = MemoryObjectStore::new();
        store.insert("cat.jpg", StoredObject::new(&b"png"[..], Some("image/png")));

        let mut p = params("https://images.example.com/cat.jpg");
        p.storage = Some(Arc::new(store.clone()));

        let response = DirectServingStrategy.execute(&p).await.unwrap();
        assert_eq!(response.body, Bytes::from_static(b"png"));
        assert_eq!(store.reads(), vec!["cat.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let mut p = params("https://images.example.com/missing.jpg");
        p.storage = Some(Arc::new(MemoryObjectStore::new()));
        let err = DirectServingStrategy.execute(&p).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
