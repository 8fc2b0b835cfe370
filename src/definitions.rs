//! Mock definitions loaded from YAML files.
//!
//! A definition file lists mocks with their request criteria and a tagged
//! reply:
//!
//! ```yaml
//! version: 1
//! mocks:
//!   - name: list users
//!     request:
//!       method: GET
//!       path: /users
//!       query: { page: "1" }
//!     reply:
//!       type: static
//!       status: 200
//!       headers: { content-type: application/json }
//!       body: '[]'
//! ```

use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::Path};

use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;
use crate::matchers::{Contains, JsonEqualTo, PathMatcher};
use crate::mock::{Mock, MockBuilder, MockHandle};
use crate::reply::{ForwardReply, RandomReply, Reply, StaticReply};
use crate::request::Selector;

/// Errors that can occur when loading or converting mock definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// I/O error while reading the definition file.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// YAML parsing error.
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// A duration field could not be parsed.
    #[error("mock {mock}: invalid duration {value:?}: {source}")]
    Duration {
        mock: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    /// A definition produced an invalid mock.
    #[error("mock {mock}: {source}")]
    Config {
        mock: String,
        #[source]
        source: ConfigError,
    },
}

/// A collection of mock definitions.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MockBook {
    /// Schema version of the definition file.
    pub version: Option<u8>,
    /// Mocks in registration order.
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,
}

/// One mock: request criteria plus the reply to send.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MockDefinition {
    /// Name shown in diagnostics.
    pub name: Option<String>,
    /// Higher priorities are tried first.
    #[serde(default)]
    pub priority: i32,
    /// Disabled mocks are registered but never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Request criteria; every present field must match.
    #[serde(default)]
    pub request: RequestDefinition,
    /// Reply sent when the request matches.
    pub reply: ReplyDefinition,
}

fn default_enabled() -> bool {
    true
}

/// Request criteria of a mock definition.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RequestDefinition {
    /// HTTP method, compared case-insensitively.
    pub method: Option<String>,
    /// Exact path.
    pub path: Option<String>,
    /// Regular expression the path must match.
    pub path_pattern: Option<String>,
    /// Header values, compared exactly.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameter values, compared exactly.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Exact body.
    pub body: Option<String>,
    /// Text the body must contain.
    pub body_contains: Option<String>,
    /// JSON document the body must be structurally equal to.
    pub json_body: Option<serde_json::Value>,
}

/// Reply of a mock definition, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyDefinition {
    /// Fixed response.
    Static {
        #[serde(default = "default_status")]
        status: u16,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        body: Option<String>,
        /// Serialized as the body; sets `content-type: application/json` unless given.
        json: Option<serde_json::Value>,
        /// Delay before responding (e.g. `100ms`).
        delay: Option<String>,
    },
    /// Proxy to a real backend.
    Forward {
        destination: String,
        #[serde(default)]
        proxy_headers: BTreeMap<String, String>,
        #[serde(default)]
        remove_proxy_headers: Vec<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Upstream timeout (e.g. `2s`).
        timeout: Option<String>,
    },
    /// Uniformly chosen sub-reply.
    Random { replies: Vec<ReplyDefinition> },
}

fn default_status() -> u16 {
    200
}

impl MockBook {
    /// Load mock definitions from a YAML file.
    ///
    /// # Parameters
    ///
    /// - `path` - Path to the YAML definition file
    ///
    /// # Returns
    ///
    /// Returns `Ok(MockBook)` on success, or `DefinitionError` if the file
    /// cannot be read or parsed.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let txt = fs::read_to_string(path)?;
        Self::from_yaml_str(&txt)
    }

    /// Parse mock definitions from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::Yaml` if the text is not a valid definition file.
    pub fn from_yaml_str(txt: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(txt)?)
    }

    /// Convert every definition into a [`Mock`].
    ///
    /// # Returns
    ///
    /// Returns the mocks in file order.
    ///
    /// # Errors
    ///
    /// Returns the first definition error, labelled with the mock's name or position.
    pub fn into_mocks(self) -> Result<Vec<Mock>, DefinitionError> {
        self.mocks
            .into_iter()
            .enumerate()
            .map(|(idx, def)| {
                let label = def.name.clone().unwrap_or_else(|| format!("#{}", idx + 1));
                def.into_mock(&label)
            })
            .collect()
    }

    /// Convert and register every definition with `dispatcher`.
    ///
    /// Registration stops at the first invalid definition; mocks registered
    /// before it stay registered.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if a definition cannot be converted or registered.
    pub fn register_all(self, dispatcher: &Dispatcher) -> Result<Vec<MockHandle>, DefinitionError> {
        let mut handles = Vec::with_capacity(self.mocks.len());
        for (idx, def) in self.mocks.into_iter().enumerate() {
            let label = def.name.clone().unwrap_or_else(|| format!("#{}", idx + 1));
            let mock = def.into_mock(&label)?;
            let handle = dispatcher
                .register(mock)
                .map_err(|source| DefinitionError::Config { mock: label, source })?;
            handles.push(handle);
        }
        Ok(handles)
    }
}

impl MockDefinition {
    fn into_mock(self, label: &str) -> Result<Mock, DefinitionError> {
        let config_err = |source| DefinitionError::Config { mock: label.to_string(), source };

        let mut builder = MockBuilder::new().priority(self.priority);
        if let Some(name) = self.name {
            builder = builder.named(name);
        }
        if !self.enabled {
            builder = builder.disabled();
        }

        let req = self.request;
        if let Some(method) = req.method {
            let parsed = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| config_err(ConfigError::InvalidMethod(method)))?;
            builder = builder.method(parsed);
        }
        if let Some(path) = req.path {
            builder = builder.path(path);
        }
        if let Some(pattern) = req.path_pattern {
            let matcher = PathMatcher::pattern(&pattern).map_err(config_err)?;
            builder = builder.and(Selector::Path, matcher);
        }
        for (name, value) in req.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in req.query {
            builder = builder.query(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        if let Some(needle) = req.body_contains {
            builder = builder.and(Selector::Body, Contains::new(needle));
        }
        if let Some(json) = req.json_body {
            builder = builder.and(Selector::Body, JsonEqualTo::new(json));
        }

        let reply = self.reply.into_reply(label)?;
        Ok(builder.reply(reply))
    }
}

impl ReplyDefinition {
    fn into_reply(self, label: &str) -> Result<Reply, DefinitionError> {
        let duration = |value: String| {
            humantime::parse_duration(&value).map_err(|source| DefinitionError::Duration {
                mock: label.to_string(),
                value,
                source,
            })
        };

        match self {
            Self::Static { status, headers, body, json, delay } => {
                let status = StatusCode::from_u16(status).map_err(|_| DefinitionError::Config {
                    mock: label.to_string(),
                    source: ConfigError::InvalidStatus(status),
                })?;
                let mut reply = StaticReply::new(status);
                let has_content_type =
                    headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
                for (name, value) in headers {
                    reply = reply.header(name, value);
                }
                if let Some(body) = body {
                    reply = reply.body(body);
                }
                if let Some(json) = json {
                    if !has_content_type {
                        reply = reply.header("content-type", "application/json");
                    }
                    reply = reply.body(json.to_string());
                }
                if let Some(delay) = delay {
                    reply = reply.delay(duration(delay)?);
                }
                Ok(reply.into())
            }
            Self::Forward {
                destination,
                proxy_headers,
                remove_proxy_headers,
                headers,
                timeout,
            } => {
                let mut reply = ForwardReply::new(destination);
                for (name, value) in proxy_headers {
                    reply = reply.proxy_header(name, value);
                }
                for name in remove_proxy_headers {
                    reply = reply.remove_proxy_header(name);
                }
                for (name, value) in headers {
                    reply = reply.header(name, value);
                }
                if let Some(timeout) = timeout {
                    reply = reply.timeout(duration(timeout)?);
                }
                Ok(reply.into())
            }
            Self::Random { replies } => {
                let replies = replies
                    .into_iter()
                    .map(|def| def.into_reply(label))
                    .collect::<Result<Vec<Reply>, _>>()?;
                Ok(replies.into_iter().collect::<RandomReply>().into())
            }
        }
    }
}
