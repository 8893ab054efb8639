//! Object storage collaborator.
//!
//! The service treats storage as an opaque key-value blob store: a single
//! `get(key)` that either yields the object with its content type or reports
//! that the key does not exist. Production uses S3 (or any S3-compatible
//! endpoint); tests use [`MemoryObjectStore`].

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::StorageConfig;

/// Errors surfaced by a storage backend. A missing key is not an error.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage request timed out: {0}")]
    Timeout(String),
    /// The backend answered with an error code (`AccessDenied`, `SlowDown`, ...)
    #[error("storage service error {}: {message}", .code.as_deref().unwrap_or("(no code)"))]
    Service {
        code: Option<String>,
        message: String,
    },
    #[error("storage backend unreachable: {0}")]
    Transport(String),
    #[error("failed to read object body for '{key}': {message}")]
    Body { key: String, message: String },
}

impl StorageError {
    fn from_get_object<R: std::fmt::Debug>(err: SdkError<GetObjectError, R>) -> Self {
        match &err {
            SdkError::TimeoutError(_) => {
                StorageError::Timeout(DisplayErrorContext(&err).to_string())
            }
            SdkError::ServiceError(service) => {
                let service = service.err();
                StorageError::Service {
                    code: service.code().map(str::to_string),
                    message: service.message().unwrap_or_default().to_string(),
                }
            }
            _ => StorageError::Transport(DisplayErrorContext(&err).to_string()),
        }
    }
}

/// An object read from storage
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub size: u64,
    pub etag: Option<String>,
}

impl StoredObject {
    pub fn new(body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        let body = body.into();
        Self {
            size: body.len() as u64,
            body,
            content_type: content_type.map(str::to_string),
            etag: None,
        }
    }

    /// Content type, defaulting to a generic binary type
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// Key-value blob store holding original images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError>;
}

/// S3-backed object store
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the storage section of the configuration.
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS provider chain applies. A custom endpoint switches the
    /// client to path-style addressing (MinIO, R2, LocalStack).
    pub async fn connect(config: &StorageConfig) -> Self {
        let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "kagami-config",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint,
            "Storage client configured"
        );

        Self::new(Client::from_conf(builder.build()), config.bucket.clone())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                return Err(StorageError::from_get_object(err));
            }
        };

        let content_type = output.content_type().map(str::to_string);
        let etag = output.e_tag().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        Ok(Some(StoredObject {
            size: body.len() as u64,
            body,
            content_type,
            etag,
        }))
    }
}

/// In-memory object store (tests, local development)
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failure: Arc<RwLock<Option<StorageError>>>,
    reads: Arc<RwLock<Vec<String>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, object: StoredObject) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.to_string(), object);
        }
    }

    /// Make every subsequent read fail with the given error
    pub fn fail_with(&self, error: StorageError) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = Some(error);
        }
    }

    /// Keys read so far, in order
    pub fn reads(&self) -> Vec<String> {
        self.reads.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        if let Ok(mut reads) = self.reads.write() {
            reads.push(key.to_string());
        }
        if let Some(error) = self.failure.read().ok().and_then(|f| f.clone()) {
            return Err(error);
        }
        Ok(self
            .objects
            .read()
            .ok()
            .and_then(|objects| objects.get(key).cloned()))
    }
}
