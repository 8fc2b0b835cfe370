//! Error types shared by mock registration and reply building.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Invalid mock, reply or server configuration.
///
/// These are reported when a mock is registered or the server is built, so a
/// broken expectation fails the test setup instead of an individual request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A random reply was configured without any sub-reply.
    #[error("random reply needs at least one sub-reply")]
    EmptyRandomReply,
    /// A header name or value could not be used in an HTTP message.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },
    /// A regular expression failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// A forward destination is not an absolute http(s) URL.
    #[error("invalid forward destination {destination:?}: {reason}")]
    InvalidDestination { destination: String, reason: String },
    /// A status code outside the 100..=999 range.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
    /// A method token that is not a valid HTTP method.
    #[error("invalid method {0:?}")]
    InvalidMethod(String),
    /// The HTTP client used for forwarding could not be created.
    #[error("failed to build forwarding client: {0}")]
    HttpClient(String),
}

/// Failure talking to the destination of a forwarding reply.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream {url} did not respond within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("upstream {url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

impl UpstreamError {
    /// Gateway-class status code describing the failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Unreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Failure while a reply builds its response.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ReplyError {
    /// Status code used when the failure is rendered as a response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(err) => err.status(),
        }
    }

    /// Short machine-readable classification.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Upstream(UpstreamError::Timeout { .. }) => "upstream_timeout",
            Self::Upstream(UpstreamError::Unreachable { .. }) => "upstream_unreachable",
        }
    }
}
