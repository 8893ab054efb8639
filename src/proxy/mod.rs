// Proxy module - Pingora ProxyHttp implementation
// Every request is answered inside request_filter; nothing is proxied upstream

pub mod special_endpoints;

use async_trait::async_trait;
use bytes::Bytes;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::{ImageRequest, ImageResponse, RequestContext};
use crate::service::ImageService;

use special_endpoints::{special_endpoint, EndpointResponse};

/// KagamiProxy implements the Pingora ProxyHttp trait on top of [`ImageService`]
pub struct KagamiProxy {
    service: Arc<ImageService>,
    /// Proxy start time (for uptime calculation in /health endpoint)
    start_time: Instant,
}

impl KagamiProxy {
    pub fn new(service: Arc<ImageService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}

async fn write_endpoint_response(
    session: &mut Session,
    response: EndpointResponse,
    head_only: bool,
) -> Result<()> {
    let mut header = ResponseHeader::build(response.status, None)?;
    header.insert_header("Content-Type", response.content_type)?;
    header.insert_header("Content-Length", response.body.len().to_string())?;

    session
        .write_response_header(Box::new(header), head_only)
        .await?;
    if !head_only {
        session
            .write_response_body(Some(Bytes::from(response.body)), true)
            .await?;
    }
    Ok(())
}

async fn write_image_response(
    session: &mut Session,
    response: ImageResponse,
    head_only: bool,
) -> Result<()> {
    let mut header = ResponseHeader::build(response.status.as_u16(), None)?;
    for (name, value) in response.headers.iter() {
        if name == http::header::CONTENT_LENGTH || name == http::header::TRANSFER_ENCODING {
            continue;
        }
        header.insert_header(name.clone(), value.clone())?;
    }
    header.insert_header("Content-Length", response.body.len().to_string())?;

    session
        .write_response_header(Box::new(header), head_only)
        .await?;
    if !head_only {
        session
            .write_response_body(Some(response.body), true)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl ProxyHttp for KagamiProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Never reached: request_filter answers every request
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        tracing::error!(request_id = %ctx.request_id(), "upstream_peer called unexpectedly");
        Err(pingora_core::Error::explain(
            pingora_core::ErrorType::InternalError,
            "kagami does not proxy to an upstream peer",
        ))
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        let request = ImageRequest::from_parts(req.method.as_str(), &req.uri, req.headers.clone());
        let head_only = request.method == "HEAD";

        if let Some(endpoint) =
            special_endpoint(&request.path, self.start_time, self.service.metrics())
        {
            write_endpoint_response(session, endpoint, head_only).await?;
            return Ok(true);
        }

        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %request.method,
            host = %request.host,
            path = %request.path,
            "Received request"
        );

        let response = self.service.handle(request, ctx).await;
        write_image_response(session, response, head_only).await?;

        // Response already sent
        Ok(true)
    }
}
