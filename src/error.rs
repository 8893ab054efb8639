// Error types module
//
// Every failure that can reach a client is an `ImageServiceError`. Its
// `ErrorKind` decides the HTTP status and the machine-readable code. Storage
// and fetch errors are classified by variant first; only backend error codes
// and transport messages (never keys or URLs) are inspected as text.

use http::header::CACHE_CONTROL;
use http::StatusCode;
use thiserror::Error;

use crate::constants::NO_STORE;
use crate::fetch::FetchError;
use crate::pipeline::ImageResponse;
use crate::storage::StorageError;
use crate::strategy::StrategyAttempt;

/// Coarse error category, one HTTP status each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    Timeout,
    UpstreamFailure,
    Configuration,
    Unknown,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::Configuration | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Authorization => "FORBIDDEN",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Authorization => "forbidden",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UpstreamFailure => "upstream",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Classify an opaque error message.
    ///
    /// Order matters: a "timed out while fetching: 404" message is a
    /// not-found, not a timeout.
    pub fn classify(message: &str) -> ErrorKind {
        let msg = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["not found", "nosuchkey", "no such key", "404"]) {
            ErrorKind::NotFound
        } else if has(&["timeout", "timed out", "504"]) {
            ErrorKind::Timeout
        } else if has(&["forbidden", "unauthorized", "access denied", "403", "401"]) {
            ErrorKind::Authorization
        } else if has(&["invalid", "validation", "malformed", "400"]) {
            ErrorKind::Validation
        } else if has(&["config"]) {
            ErrorKind::Configuration
        } else if has(&["upstream", "bad gateway", "502", "503"]) {
            ErrorKind::UpstreamFailure
        } else {
            ErrorKind::Unknown
        }
    }

    /// Classify an S3-style service error code
    pub fn from_service_code(code: &str) -> Option<ErrorKind> {
        match code {
            "NoSuchKey" | "NotFound" => Some(ErrorKind::NotFound),
            "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch" | "AccountProblem" | "Forbidden" => {
                Some(ErrorKind::Authorization)
            }
            "RequestTimeout" => Some(ErrorKind::Timeout),
            "NoSuchBucket" | "PermanentRedirect" | "AuthorizationHeaderMalformed" => {
                Some(ErrorKind::Configuration)
            }
            _ => None,
        }
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::Timeout(_) => ErrorKind::Timeout,
        StorageError::Service { code, message } => code
            .as_deref()
            .and_then(ErrorKind::from_service_code)
            .unwrap_or_else(|| match ErrorKind::classify(message) {
                ErrorKind::Unknown => ErrorKind::UpstreamFailure,
                kind => kind,
            }),
        StorageError::Transport(_) | StorageError::Body { .. } => ErrorKind::UpstreamFailure,
    }
}

/// Errors surfaced by the image service
#[derive(Debug, Error)]
pub enum ImageServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("All transformation strategies failed: {}", summarize_attempts(.attempts))]
    StrategiesExhausted { attempts: Vec<StrategyAttempt> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

fn summarize_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no applicable strategy".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ImageServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageServiceError::Validation(_) => ErrorKind::Validation,
            ImageServiceError::NotFound(_) => ErrorKind::NotFound,
            ImageServiceError::Timeout(_) => ErrorKind::Timeout,
            ImageServiceError::StrategiesExhausted { .. } => ErrorKind::UpstreamFailure,
            ImageServiceError::Configuration(_) => ErrorKind::Configuration,
            ImageServiceError::Fetch(FetchError::Timeout { .. }) => ErrorKind::Timeout,
            ImageServiceError::Fetch(FetchError::Client(_)) => ErrorKind::Configuration,
            ImageServiceError::Fetch(FetchError::InvalidHeader { .. }) => ErrorKind::Validation,
            ImageServiceError::Fetch(FetchError::Transport { message, .. }) => {
                match ErrorKind::classify(message) {
                    ErrorKind::Unknown => ErrorKind::UpstreamFailure,
                    kind => kind,
                }
            }
            ImageServiceError::Storage(err) => storage_kind(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    pub fn code(&self) -> &'static str {
        match self {
            ImageServiceError::StrategiesExhausted { .. } => "STRATEGIES_EXHAUSTED",
            other => other.kind().code(),
        }
    }

    /// Render as a minimal JSON error response with `Cache-Control: no-store`.
    ///
    /// `expose_detail` adds the proximate cause; production keeps it off.
    pub fn to_response(&self, expose_detail: bool) -> ImageResponse {
        let kind = self.kind();
        let status = kind.status();

        let mut error = serde_json::json!({
            "code": self.code(),
            "category": kind.category(),
            "status": status.as_u16(),
        });
        if expose_detail {
            error["message"] = serde_json::Value::String(self.to_string());
        }

        let mut response = ImageResponse::json(status, &serde_json::json!({ "error": error }));
        response.set_header(CACHE_CONTROL.as_str(), NO_STORE);
        response
    }
}
