// Request pipeline module - request context and the HTTP value types that
// flow between the front end, the resolvers and the strategy chain

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-request context carried through the Pingora session
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
}

impl RequestContext {
    /// Create a new RequestContext with a fresh UUID v4 request id
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    /// Get the unique request ID
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Time spent since the request entered the pipeline
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An inbound image request, detached from the HTTP framework
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub raw_query: Option<String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
}

impl ImageRequest {
    /// Build a request from a URI and its headers.
    ///
    /// Pingora hands us origin-form URIs (`/path?query`), so the host falls
    /// back to the `Host` header and the scheme to `x-forwarded-proto`.
    pub fn from_parts(method: &str, uri: &Uri, headers: HeaderMap) -> Self {
        let host = uri
            .host()
            .map(|h| match uri.port_u16() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            })
            .or_else(|| {
                headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let scheme = uri
            .scheme_str()
            .map(str::to_string)
            .or_else(|| {
                headers
                    .get("x-forwarded-proto")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "http".to_string());

        let raw_query = uri.query().map(str::to_string);
        let query = parse_query(raw_query.as_deref().unwrap_or(""));

        Self {
            method: method.to_string(),
            scheme,
            host: host.to_ascii_lowercase(),
            path: uri.path().to_string(),
            raw_query,
            query,
            headers,
        }
    }

    /// Build a GET request from an absolute URL
    pub fn get(url: &str) -> Result<Self, http::uri::InvalidUri> {
        let uri: Uri = url.parse()?;
        Ok(Self::from_parts("GET", &uri, HeaderMap::new()))
    }

    /// Attach a header (builder style, used by the front end and tests)
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query parameter value
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Hostname without port
    pub fn hostname(&self) -> &str {
        self.host.split(':').next().unwrap_or(&self.host)
    }

    /// URL of the requested resource without the query string
    pub fn resource_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }

    /// Full request URL including the query string
    pub fn url(&self) -> String {
        match &self.raw_query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.resource_url(), q),
            _ => self.resource_url(),
        }
    }
}

/// Parse `a=1&b=two` into a map, percent-decoding values
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

/// Form-style decoding: `+` is a space, invalid escapes are kept verbatim
fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|v| v.into_owned())
        .unwrap_or(raw)
}

/// A response produced by a strategy, the storage passthrough or the error layer
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ImageResponse {
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Response with a body and content type
    pub fn with_body(status: StatusCode, content_type: &str, body: Bytes) -> Self {
        let mut response = Self::new(status, body);
        response.set_header(CONTENT_TYPE.as_str(), content_type);
        response
    }

    /// JSON response
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::with_body(
            status,
            "application/json",
            Bytes::from(value.to_string()),
        )
    }

    /// 2xx or a redirect
    pub fn is_success(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Insert a header, silently skipping values that are not valid header text
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn content_length(&self) -> usize {
        self.header(CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len())
    }
}
