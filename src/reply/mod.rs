//! Reply strategies that turn a matched request into a response.
//!
//! [`Reply`] is a closed set of variants sharing one `build` operation:
//! fixed responses, forwarding to a real backend, and a random pick among
//! sub-replies.

pub mod fixed;
pub mod forward;
pub mod random;

pub use fixed::StaticReply;
pub use forward::ForwardReply;
pub use random::RandomReply;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use rand::rngs::StdRng;
use tracing::debug;

use crate::error::{ConfigError, ReplyError};
use crate::mock::Mock;
use crate::request::{MockRequest, MockResponse};

/// Dependencies a reply may need while building a response.
pub struct ReplyContext<'a> {
    /// Client used by forwarding replies
    pub client: &'a reqwest::Client,
    /// Random source used by random replies
    pub rng: &'a Mutex<StdRng>,
    /// Timeout for forwarding replies that do not set their own
    pub forward_timeout: Duration,
}

/// Response building strategy of a mock.
#[derive(Debug, Clone)]
pub enum Reply {
    Static(StaticReply),
    Forward(ForwardReply),
    Random(RandomReply),
}

impl Reply {
    /// Empty `200 OK` reply.
    pub fn ok() -> Self {
        Self::Static(StaticReply::new(StatusCode::OK))
    }

    /// Empty reply with the given status.
    pub fn status(status: StatusCode) -> Self {
        Self::Static(StaticReply::new(status))
    }

    /// Check the reply, and nested sub-replies, can be used.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Static(reply) => reply.validate(),
            Self::Forward(reply) => reply.validate(),
            Self::Random(reply) => reply.validate(),
        }
    }

    /// Build the response for a matched request.
    ///
    /// # Parameters
    ///
    /// - `request` - The request that matched
    /// - `mock` - The mock that owns this reply
    /// - `ctx` - Shared client, random source and defaults
    ///
    /// # Returns
    ///
    /// Returns the built response.
    ///
    /// # Errors
    ///
    /// Returns `ReplyError::Configuration` for an empty random reply and
    /// `ReplyError::Upstream` when a forward destination fails.
    pub async fn build(
        &self,
        request: &MockRequest,
        mock: &Mock,
        ctx: &ReplyContext<'_>,
    ) -> Result<MockResponse, ReplyError> {
        match self.resolve(ctx.rng)? {
            Self::Static(reply) => Ok(reply.build().await),
            Self::Forward(reply) => {
                debug!("{} forwarding {} {}", mock, request.method, request.path);
                reply.build(request, ctx).await
            }
            Self::Random(_) => Err(ConfigError::EmptyRandomReply.into()),
        }
    }

    /// Follow random replies down to a concrete one, drawing once per level.
    fn resolve(&self, rng: &Mutex<StdRng>) -> Result<&Reply, ConfigError> {
        let mut reply = self;
        while let Self::Random(random) = reply {
            let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
            reply = random.choose(&mut *rng)?;
        }
        Ok(reply)
    }
}

impl From<StaticReply> for Reply {
    fn from(reply: StaticReply) -> Self {
        Self::Static(reply)
    }
}

impl From<ForwardReply> for Reply {
    fn from(reply: ForwardReply) -> Self {
        Self::Forward(reply)
    }
}

impl From<RandomReply> for Reply {
    fn from(reply: RandomReply) -> Self {
        Self::Random(reply)
    }
}

/// Header pairs collected by reply builders.
///
/// Invalid names or values are remembered and reported by `validate` so
/// builders can stay chainable.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderRules {
    pub(crate) headers: axum::http::HeaderMap,
    rejected: Vec<String>,
}

impl HeaderRules {
    pub(crate) fn append(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => self.rejected.push(name.to_string()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self.rejected.first() {
            Some(name) => Err(ConfigError::InvalidHeader { name: name.clone() }),
            None => Ok(()),
        }
    }

    /// Replace every header of `target` that these rules name, keeping the rest.
    pub(crate) fn apply_to(&self, target: &mut axum::http::HeaderMap) {
        for name in self.headers.keys() {
            target.remove(name);
        }
        for (name, value) in &self.headers {
            target.append(name.clone(), value.clone());
        }
    }
}
