//! Fixed responses.

use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use tokio::time::sleep;

use crate::error::ConfigError;
use crate::reply::HeaderRules;
use crate::request::MockResponse;

/// Reply returning the same status, headers and body every time.
#[derive(Debug, Clone)]
pub struct StaticReply {
    status: StatusCode,
    headers: HeaderRules,
    body: Bytes,
    /// Artificial delay before responding
    delay: Duration,
}

impl StaticReply {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderRules::default(), body: Bytes::new(), delay: Duration::ZERO }
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.headers.append(name.as_ref(), value.as_ref());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.headers.validate()
    }

    pub async fn build(&self) -> MockResponse {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        MockResponse {
            status: self.status,
            headers: self.headers.headers.clone(),
            body: self.body.clone(),
        }
    }
}
