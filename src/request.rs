//! Abstract request and response model used by the matching engine.
//!
//! The engine never touches the transport directly: the HTTP adapter converts
//! incoming requests into a [`MockRequest`] and renders the resulting
//! [`MockResponse`] back onto the wire.

use std::fmt;

use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use crate::value::Value;

/// An inbound request with a fully buffered body.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockRequest {
    /// Create a request with no query, headers or body.
    ///
    /// # Parameters
    ///
    /// - `method` - HTTP method
    /// - `path` - Request path, starting with `/`
    ///
    /// # Returns
    ///
    /// Returns a new `MockRequest` instance.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build a request from the head of an HTTP request and its collected body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Set the raw query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Append a header value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path followed by `?query` when a query string is present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }

    /// Decode every value of the named query parameter, in order of appearance.
    ///
    /// `+` is decoded as a space; pairs that fail percent-decoding are kept raw.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        let Some(query) = self.query.as_deref() else {
            return Vec::new();
        };

        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key) == name).then(|| decode_component(value))
            })
            .collect()
    }

    /// First value of a header as text, if present and valid UTF-8.
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// The response produced for a request, either by a reply or by the dispatcher itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Append a header value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The part of a request a matcher is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Method,
    Path,
    /// Header by lower-cased name; all values are selected.
    Header(String),
    /// Decoded query parameter by name; all values are selected.
    Query(String),
    Body,
}

impl Selector {
    /// Select a header by name. Header names are case-insensitive.
    pub fn header(name: impl AsRef<str>) -> Self {
        Self::Header(name.as_ref().to_ascii_lowercase())
    }

    /// Select a query parameter by name.
    pub fn query(name: impl Into<String>) -> Self {
        Self::Query(name.into())
    }

    /// Extract the selected value from a request.
    ///
    /// # Parameters
    ///
    /// - `request` - Request to read from
    ///
    /// # Returns
    ///
    /// Returns `None` when the selected header or query parameter is absent.
    /// Repeated keys produce a [`Value::List`]. The body is always present,
    /// possibly as zero-length bytes.
    pub fn select(&self, request: &MockRequest) -> Option<Value> {
        match self {
            Self::Method => Some(Value::Text(request.method.as_str().to_string())),
            Self::Path => Some(Value::Text(request.path.clone())),
            Self::Header(name) => collapse(
                request
                    .headers
                    .get_all(name.as_str())
                    .iter()
                    .map(|v| match v.to_str() {
                        Ok(text) => Value::Text(text.to_string()),
                        Err(_) => Value::Bytes(Bytes::copy_from_slice(v.as_bytes())),
                    })
                    .collect(),
            ),
            Self::Query(name) => {
                collapse(request.query_values(name).into_iter().map(Value::Text).collect())
            }
            Self::Body => Some(Value::Bytes(request.body.clone())),
        }
    }
}

fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::List(values)),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method => f.write_str("method"),
            Self::Path => f.write_str("path"),
            Self::Header(name) => write!(f, "header({name})"),
            Self::Query(name) => write!(f, "query({name})"),
            Self::Body => f.write_str("body"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test query decoding with repeated keys and encoded characters.
    #[test]
    fn test_query_values() {
        let request =
            MockRequest::new(Method::GET, "/search").with_query("q=hello+world&tag=a&tag=b%2Fc");

        assert_eq!(request.query_values("q"), vec!["hello world".to_string()]);
        assert_eq!(request.query_values("tag"), vec!["a".to_string(), "b/c".to_string()]);
        assert!(request.query_values("missing").is_empty());
        assert_eq!(request.path_and_query(), "/search?q=hello+world&tag=a&tag=b%2Fc");
    }

    /// Test selectors for headers, including absent and repeated values.
    #[test]
    fn test_header_selector() {
        let request = MockRequest::new(Method::GET, "/")
            .with_header(HeaderName::from_static("x-one"), HeaderValue::from_static("1"))
            .with_header(HeaderName::from_static("x-many"), HeaderValue::from_static("a"))
            .with_header(HeaderName::from_static("x-many"), HeaderValue::from_static("b"));

        assert_eq!(Selector::header("X-One").select(&request), Some(Value::from("1")));
        assert_eq!(
            Selector::header("x-many").select(&request),
            Some(Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(Selector::header("x-none").select(&request), None);

        assert_eq!(request.header_str("X-One"), Some("1"));
        assert_eq!(request.header_str("x-many"), Some("a"));
        assert_eq!(request.header_str("x-none"), None);
    }

    /// Test the body selector always yields a value.
    #[test]
    fn test_body_selector_empty() {
        let request = MockRequest::new(Method::POST, "/");
        assert_eq!(Selector::Body.select(&request), Some(Value::Bytes(Bytes::new())));
        assert_eq!(Selector::Method.select(&request), Some(Value::from("POST")));
    }
}
