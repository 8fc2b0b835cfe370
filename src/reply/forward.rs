//! Forwarding replies: proxy the matched request to a real backend.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName};
use tracing::{debug, warn};

use crate::error::{ConfigError, ReplyError, UpstreamError};
use crate::reply::{HeaderRules, ReplyContext};
use crate::request::{MockRequest, MockResponse};

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

/// Build the client used for forwarding.
///
/// Redirects are not followed: a `3xx` from the destination is relayed to the
/// caller like any other status.
///
/// # Errors
///
/// Returns `ConfigError::HttpClient` if the TLS backend cannot be initialized.
pub fn forwarding_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Reply forwarding the request to `destination` and relaying the answer.
///
/// Proxy header rules only touch the outbound request; the inbound request is
/// left untouched. Response header rules override same-named upstream headers
/// and leave the others in place.
#[derive(Debug, Clone)]
pub struct ForwardReply {
    destination: String,
    proxy_headers: HeaderRules,
    remove_proxy_headers: Vec<String>,
    response_headers: HeaderRules,
    timeout: Option<Duration>,
}

impl ForwardReply {
    /// Create a forwarding reply.
    ///
    /// # Parameters
    ///
    /// - `destination` - Base URL; the request path and query are appended to it
    ///
    /// # Returns
    ///
    /// Returns a new `ForwardReply` instance.
    pub fn new(destination: impl Into<String>) -> Self {
        let destination = destination.into().trim_end_matches('/').to_string();
        Self {
            destination,
            proxy_headers: HeaderRules::default(),
            remove_proxy_headers: Vec::new(),
            response_headers: HeaderRules::default(),
            timeout: None,
        }
    }

    /// Set a header on the outbound request.
    pub fn proxy_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.proxy_headers.append(name.as_ref(), value.as_ref());
        self
    }

    /// Strip a header from the outbound request.
    pub fn remove_proxy_header(mut self, name: impl AsRef<str>) -> Self {
        self.remove_proxy_headers.push(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Set a header on the relayed response, overriding the upstream value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.response_headers.append(name.as_ref(), value.as_ref());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDestination {
            destination: self.destination.clone(),
            reason,
        };
        let url = reqwest::Url::parse(&self.destination).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("timeout must be greater than zero".to_string()));
        }
        let invalid_removal = self
            .remove_proxy_headers
            .iter()
            .find(|n| HeaderName::from_bytes(n.as_bytes()).is_err());
        if let Some(name) = invalid_removal {
            return Err(ConfigError::InvalidHeader { name: name.clone() });
        }
        self.proxy_headers.validate()?;
        self.response_headers.validate()
    }

    /// Headers for the outbound request, derived from a copy of the inbound ones.
    fn outbound_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = inbound.clone();
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);
        for name in &self.remove_proxy_headers {
            headers.remove(name.as_str());
        }
        self.proxy_headers.apply_to(&mut headers);
        headers
    }

    /// Forward the request and relay the upstream response.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Timeout` when the destination does not answer
    /// in time and `UpstreamError::Unreachable` for any other transport failure.
    pub async fn build(
        &self,
        request: &MockRequest,
        ctx: &ReplyContext<'_>,
    ) -> Result<MockResponse, ReplyError> {
        let url = format!("{}{}", self.destination, request.path_and_query());
        let timeout = self.timeout.unwrap_or(ctx.forward_timeout);
        let classify = |err: reqwest::Error| {
            if err.is_timeout() {
                UpstreamError::Timeout { url: url.clone(), timeout }
            } else {
                UpstreamError::Unreachable { url: url.clone(), reason: err.to_string() }
            }
        };

        debug!("forwarding {} {} to {}", request.method, request.path, url);

        let response = ctx
            .client
            .request(request.method.clone(), &url)
            .headers(self.outbound_headers(&request.headers))
            .body(request.body.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!("forward to {} failed: {}", url, e);
                classify(e)
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?;

        strip_hop_by_hop(&mut headers);
        self.response_headers.apply_to(&mut headers);

        debug!("upstream {} answered {}", url, status);
        Ok(MockResponse { status, headers, body })
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
