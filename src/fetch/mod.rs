//! Outbound HTTP collaborator.
//!
//! Strategies never talk to `reqwest` directly: they build an
//! [`OutboundRequest`] and hand it to an [`HttpFetcher`]. Production uses
//! [`ReqwestFetcher`]; tests use [`StubFetcher`], which answers from a table
//! of URL prefixes and records every call.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::ImageResponse;

/// Errors raised before any HTTP status is available
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("invalid outbound header '{name}'")]
    InvalidHeader { name: String },
}

/// A GET request leaving the service
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a header, rejecting names or values HTTP cannot carry
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, FetchError> {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(header_name), Ok(header_value)) => {
                self.headers.insert(header_name, header_value);
                Ok(self)
            }
            _ => Err(FetchError::InvalidHeader {
                name: name.to_string(),
            }),
        }
    }
}

/// Issues outbound HTTP requests
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: OutboundRequest) -> Result<ImageResponse, FetchError>;
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<ImageResponse, FetchError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(&request.url, e))?;

        // reqwest 0.11 speaks http 0.2; copy across by name and raw bytes
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        Ok(ImageResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        // The message is classified later; keep the URL out of it
        FetchError::Transport {
            url: url.to_string(),
            message: err.without_url().to_string(),
        }
    }
}

/// Canned reply for [`StubFetcher`]
#[derive(Debug, Clone)]
pub enum StubReply {
    Respond {
        status: StatusCode,
        content_type: String,
        body: Bytes,
    },
    Fail(FetchError),
}

impl StubReply {
    pub fn ok(content_type: &str, body: &'static [u8]) -> Self {
        StubReply::Respond {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body: Bytes::from_static(body),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        StubReply::Respond {
            status,
            content_type: "text/plain".to_string(),
            body: Bytes::from(status.to_string()),
        }
    }
}

/// Fetcher answering from a prefix table; unmatched URLs get a 404
#[derive(Debug, Clone, Default)]
pub struct StubFetcher {
    routes: Arc<RwLock<Vec<(String, StubReply)>>>,
    calls: Arc<RwLock<Vec<OutboundRequest>>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply for every URL starting with `prefix` (first match wins)
    pub fn on(&self, prefix: &str, reply: StubReply) -> &Self {
        if let Ok(mut routes) = self.routes.write() {
            routes.push((prefix.to_string(), reply));
        }
        self
    }

    /// Requests received so far, in order
    pub fn calls(&self) -> Vec<OutboundRequest> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// URLs requested so far, in order
    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }
}

#[async_trait]
impl HttpFetcher for StubFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<ImageResponse, FetchError> {
        let reply = self.routes.read().ok().and_then(|routes| {
            routes
                .iter()
                .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
                .map(|(_, reply)| reply.clone())
        });
        if let Ok(mut calls) = self.calls.write() {
            calls.push(request);
        }

        match reply {
            Some(StubReply::Respond {
                status,
                content_type,
                body,
            }) => Ok(ImageResponse::with_body(status, &content_type, body)),
            Some(StubReply::Fail(err)) => Err(err),
            None => Ok(ImageResponse::new(StatusCode::NOT_FOUND, Bytes::new())),
        }
    }
}
