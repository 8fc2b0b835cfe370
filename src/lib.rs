//! # HTTP Mock Library
//!
//! A library for mocking HTTP services in integration tests.
//!
//! This library provides components for:
//! - **Matchers**: Composable predicates over parts of a request (method, path,
//!   headers, query, body)
//! - **Mocks**: Matcher chains bound to a reply, with call counters and enable/disable handles
//! - **Replies**: Static responses, forwarding to real backends, and random choice between replies
//! - **Dispatcher**: First-match routing with CORS preflight handling and
//!   diagnostic error responses
//! - **Server**: An embeddable Axum server on an ephemeral port, plus YAML mock definitions
//!
//! # Examples
//!
//! ```no_run
//! use http_mock_rs::{Mock, MockServer, StaticReply};
//! use axum::http::{Method, StatusCode};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockServer::start().await?;
//! let handle = server
//!     .register(
//!         Mock::request(Method::GET, "/users")
//!             .header("accept", "application/json")
//!             .reply(StaticReply::new(StatusCode::OK).body("[]")),
//!     )
//!     .map_err(std::io::Error::other)?;
//!
//! // ... point the code under test at server.url() ...
//!
//! handle.assert_calls(1);
//! # Ok(())
//! # }
//! ```

pub mod cors;
pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod matchers;
pub mod mock;
pub mod reply;
pub mod request;
pub mod server;
pub mod store;
pub mod value;

// Re-export commonly used types for convenience
pub use cors::CorsPolicy;
pub use definitions::MockBook;
pub use dispatcher::{DispatchError, DispatchSettings, Dispatcher};
pub use error::{ConfigError, ReplyError, UpstreamError};
pub use matchers::{
    AnyOf, Contains, EqualTo, EqualToIgnoreCase, JsonEqualTo, MatchOutcome, Matcher, MatchesRegex,
    Not, Params, PathMatcher, Present,
};
pub use mock::{Mock, MockBuilder, MockHandle, MockId};
pub use reply::{ForwardReply, RandomReply, Reply, StaticReply};
pub use request::{MockRequest, MockResponse, Selector};
pub use server::MockServer;
pub use store::{MatchResult, MemoryStore, MockStore};
pub use value::Value;
