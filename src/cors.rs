//! CORS handling for the dispatcher.
//!
//! Preflight requests are answered directly with `204 No Content` and the
//! configured policy headers. Other responses get
//! `Access-Control-Allow-Origin` appended when the request's origin is allowed.

use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};

use crate::error::ConfigError;
use crate::request::{MockRequest, MockResponse};

/// Default max age for preflight caching (1 hour).
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS policy applied by the dispatcher.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    /// `*` or a single exact origin
    allowed_origin: String,
    allowed_methods: Vec<Method>,
    /// Empty means the request's `Access-Control-Request-Headers` are echoed
    allowed_headers: Vec<String>,
    max_age: Duration,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origin: "*".to_string(),
            allowed_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: Vec::new(),
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
        }
    }
}

impl CorsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = origin.into();
        self
    }

    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Check every configured value can be sent as a header.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHeader` naming the offending CORS header.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allowed_origin.clone()),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, self.allowed_headers.join(", ")),
        ];
        for (name, value) in checks {
            if HeaderValue::from_str(&value).is_err() {
                return Err(ConfigError::InvalidHeader { name: name.to_string() });
            }
        }
        Ok(())
    }

    /// Whether the request is a preflight request.
    pub fn is_preflight(&self, request: &MockRequest) -> bool {
        request.method == Method::OPTIONS
    }

    /// Build the preflight response: `204`, empty body and the policy headers.
    pub fn preflight(&self, request: &MockRequest) -> MockResponse {
        let mut response = MockResponse::new(StatusCode::NO_CONTENT);
        let headers = &mut response.headers;

        let origin = self
            .allowed_origin_for(request)
            .or_else(|| HeaderValue::from_str(&self.allowed_origin).ok());
        if let Some(origin) = origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }

        let methods: Vec<&str> = self.allowed_methods.iter().map(Method::as_str).collect();
        if let Ok(methods) = HeaderValue::from_str(&methods.join(", ")) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }

        let allowed_headers = if self.allowed_headers.is_empty() {
            request.headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS).cloned()
        } else {
            HeaderValue::from_str(&self.allowed_headers.join(", ")).ok()
        };
        if let Some(value) = allowed_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }

        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age.as_secs()));
        if self.allowed_origin != "*" {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
        response
    }

    /// Append CORS headers to a normal response when the origin is allowed.
    pub fn apply(&self, request: &MockRequest, response: &mut MockResponse) {
        if let Some(origin) = self.allowed_origin_for(request) {
            response.headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            if self.allowed_origin != "*" {
                response.headers.append(header::VARY, HeaderValue::from_static("Origin"));
            }
        }
    }

    /// Value of `Access-Control-Allow-Origin` for a request carrying an allowed `Origin`.
    fn allowed_origin_for(&self, request: &MockRequest) -> Option<HeaderValue> {
        let origin = request.headers.get(header::ORIGIN)?;
        if self.allowed_origin == "*" {
            Some(HeaderValue::from_static("*"))
        } else if origin.as_bytes() == self.allowed_origin.as_bytes() {
            Some(origin.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test preflight responses carry the policy headers and no body.
    #[test]
    fn test_preflight_response() {
        let policy = CorsPolicy::new()
            .allow_origin("http://app.local")
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(["content-type", "x-api-key"])
            .max_age(Duration::from_secs(600));

        let request = MockRequest::new(Method::OPTIONS, "/test")
            .with_header(header::ORIGIN, HeaderValue::from_static("http://app.local"));
        assert!(policy.is_preflight(&request));

        let response = policy.preflight(&request);
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://app.local");
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        let allowed = &response.headers[header::ACCESS_CONTROL_ALLOW_HEADERS];
        assert_eq!(allowed, "content-type, x-api-key");
        assert_eq!(response.headers[header::ACCESS_CONTROL_MAX_AGE], "600");
    }

    /// Test requested headers are echoed when no explicit list is configured.
    #[test]
    fn test_preflight_echoes_requested_headers() {
        let request = MockRequest::new(Method::OPTIONS, "/").with_header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("x-custom"),
        );
        let response = CorsPolicy::default().preflight(&request);
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
    }

    /// Test origin echoing on normal responses.
    #[test]
    fn test_apply_only_for_allowed_origin() {
        let policy = CorsPolicy::new().allow_origin("http://app.local");

        let allowed = MockRequest::new(Method::GET, "/")
            .with_header(header::ORIGIN, HeaderValue::from_static("http://app.local"));
        let mut response = MockResponse::new(StatusCode::OK);
        policy.apply(&allowed, &mut response);
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://app.local");

        let foreign = MockRequest::new(Method::GET, "/")
            .with_header(header::ORIGIN, HeaderValue::from_static("http://evil.local"));
        let mut response = MockResponse::new(StatusCode::OK);
        policy.apply(&foreign, &mut response);
        assert!(!response.headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

        assert!(CorsPolicy::new().allow_origin("bad\norigin").validate().is_err());
    }
}
