use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Source errors are shared so a failed command can hand out its error more
/// than once.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

pub(crate) fn shared_error<E>(source: E) -> SharedError
where
    E: Into<BoxError>,
{
    Arc::from(source.into())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeoutPhase {
    Connect,
    Request,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::Request => "request",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    MissingHost,
    InvalidMethod,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidTemplate,
    RequestBuild,
    PayloadConsumed,
    PayloadIo,
    TlsConfig,
    Transport,
    Timeout,
    HttpStatus,
    MissingRedirectLocation,
    InvalidRedirectLocation,
    RedirectLimitExceeded,
    NotReplayable,
    Cancelled,
    Transform,
    Deserialize,
    TaskJoin,
    Runtime,
    InvalidProperty,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::MissingHost => "missing_host",
            Self::InvalidMethod => "invalid_method",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::InvalidTemplate => "invalid_template",
            Self::RequestBuild => "request_build",
            Self::PayloadConsumed => "payload_consumed",
            Self::PayloadIo => "payload_io",
            Self::TlsConfig => "tls_config",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::MissingRedirectLocation => "missing_redirect_location",
            Self::InvalidRedirectLocation => "invalid_redirect_location",
            Self::RedirectLimitExceeded => "redirect_limit_exceeded",
            Self::NotReplayable => "not_replayable",
            Self::Cancelled => "cancelled",
            Self::Transform => "transform",
            Self::Deserialize => "deserialize",
            Self::TaskJoin => "task_join",
            Self::Runtime => "runtime",
            Self::InvalidProperty => "invalid_property",
        }
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid uri: {uri}")]
    InvalidUri { uri: String },
    #[error("endpoint has no host: {uri}")]
    MissingHost { uri: String },
    #[error("invalid http method: {method}")]
    InvalidMethod { method: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: Arc<http::header::InvalidHeaderName>,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: Arc<http::header::InvalidHeaderValue>,
    },
    #[error("invalid uri template {template}: {message}")]
    InvalidTemplate { template: String, message: String },
    #[error("invalid request: {message}")]
    RequestBuild { message: String },
    #[error("payload already written and cannot be read again")]
    PayloadConsumed,
    #[error("payload io error: {source}")]
    PayloadIo {
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("failed to configure tls: {message}")]
    TlsConfig { message: String },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: SharedError,
    },
    #[error("http request timed out in {phase} after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("http status error {status} {message} for {method} {uri}: {body}")]
    HttpStatus {
        status: u16,
        message: String,
        method: Method,
        uri: String,
        headers: Box<HeaderMap>,
        body: String,
    },
    #[error("redirect response {status} missing location for {method} {uri}")]
    MissingRedirectLocation {
        status: u16,
        method: Method,
        uri: String,
    },
    #[error("invalid redirect location {location} for {method} {uri}")]
    InvalidRedirectLocation {
        location: String,
        method: Method,
        uri: String,
    },
    #[error("redirect limit exceeded ({max_redirects}) for {method} {uri}")]
    RedirectLimitExceeded {
        max_redirects: usize,
        method: Method,
        uri: String,
    },
    #[error("cannot resubmit non-replayable request payload: {method} {uri}")]
    NotReplayable { method: Method, uri: String },
    #[error("command cancelled")]
    Cancelled,
    #[error("failed to transform response: {source}")]
    Transform {
        #[source]
        source: SharedError,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: Arc<serde_json::Error>,
        body: String,
    },
    #[error("command task failed: {source}")]
    TaskJoin {
        #[source]
        source: Arc<tokio::task::JoinError>,
    },
    #[error("failed to start blocking runtime: {source}")]
    Runtime {
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("invalid value {value:?} for property {key}")]
    InvalidProperty { key: String, value: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::MissingHost { .. } => ErrorCode::MissingHost,
            Self::InvalidMethod { .. } => ErrorCode::InvalidMethod,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::InvalidTemplate { .. } => ErrorCode::InvalidTemplate,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::PayloadConsumed => ErrorCode::PayloadConsumed,
            Self::PayloadIo { .. } => ErrorCode::PayloadIo,
            Self::TlsConfig { .. } => ErrorCode::TlsConfig,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::MissingRedirectLocation { .. } => ErrorCode::MissingRedirectLocation,
            Self::InvalidRedirectLocation { .. } => ErrorCode::InvalidRedirectLocation,
            Self::RedirectLimitExceeded { .. } => ErrorCode::RedirectLimitExceeded,
            Self::NotReplayable { .. } => ErrorCode::NotReplayable,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Transform { .. } => ErrorCode::Transform,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::TaskJoin { .. } => ErrorCode::TaskJoin,
            Self::Runtime { .. } => ErrorCode::Runtime,
            Self::InvalidProperty { .. } => ErrorCode::InvalidProperty,
        }
    }

    /// Wraps an arbitrary transformer failure.
    pub fn transform<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transform {
            source: shared_error(source),
        }
    }

    /// Status code of the response that failed the command, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    /// Truncated body of the failing response, if any.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::HttpStatus { headers, .. } => Some(headers),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|status| status.is_client_error())
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|status| status.is_server_error())
    }
}
