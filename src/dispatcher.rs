//! Request dispatching.
//!
//! Every request goes through the same stages: CORS check, matching against
//! the store, reply building, then either a response or a failure rendered as
//! a response. Nothing here panics or stops the server: every failure mode ends
//! as an HTTP-level answer to the caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cors::CorsPolicy;
use crate::error::{ConfigError, ReplyError};
use crate::mock::{Mock, MockHandle, MockId};
use crate::reply::forward::forwarding_client;
use crate::reply::ReplyContext;
use crate::request::{MockRequest, MockResponse};
use crate::store::{EvaluationFailure, MatchResult, Mismatch, MockStore};

/// Default status returned when no mock matches (`418 I'm a teapot`).
pub const DEFAULT_NO_MATCH_STATUS: StatusCode = StatusCode::IM_A_TEAPOT;

/// Default timeout for forwarding replies.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-dispatcher behaviour settings.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// CORS policy; preflight short-circuiting is disabled when `None`
    pub cors: Option<CorsPolicy>,
    /// Status of the response sent when no mock matches
    pub no_match_status: StatusCode,
    /// Timeout for forwarding replies without their own timeout
    pub forward_timeout: Duration,
    /// Stop matching at the first matcher evaluation failure
    pub fail_fast: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            cors: None,
            no_match_status: DEFAULT_NO_MATCH_STATUS,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            fail_fast: false,
        }
    }
}

/// Why a request ended in the failed state.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No mock applies. This is an expected outcome, not a fault.
    #[error("no mock matched {method} {path}")]
    NoMatch { method: String, path: String, closest: Vec<Mismatch> },
    /// Matchers failed to evaluate and no mock matched.
    #[error("matcher evaluation failed for {} mock(s)", failures.len())]
    MatchEvaluation { failures: Vec<EvaluationFailure> },
    /// The matched mock's reply could not build a response.
    #[error("mock {mock} failed to reply: {source}")]
    Reply {
        mock: MockId,
        #[source]
        source: ReplyError,
    },
}

/// JSON body of dispatcher-generated error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Always "error"
    pub status: &'a str,
    #[serde(rename = "errorType")]
    pub error_type: &'a str,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl DispatchError {
    /// Status code of the rendered response.
    pub fn status(&self, no_match_status: StatusCode) -> StatusCode {
        match self {
            Self::NoMatch { .. } => no_match_status,
            Self::MatchEvaluation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Reply { source, .. } => source.status(),
        }
    }

    /// Short machine-readable classification.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoMatch { .. } => "no_match",
            Self::MatchEvaluation { .. } => "match_evaluation",
            Self::Reply { source, .. } => source.error_type(),
        }
    }

    /// Diagnostic lines explaining the failure.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::NoMatch { closest, .. } => closest.iter().map(ToString::to_string).collect(),
            Self::MatchEvaluation { failures } => {
                failures.iter().map(ToString::to_string).collect()
            }
            Self::Reply { .. } => Vec::new(),
        }
    }

    /// Render the failure as a response with a JSON diagnostic body.
    pub fn to_response(&self, no_match_status: StatusCode) -> MockResponse {
        let body = ErrorBody {
            status: "error",
            error_type: self.error_type(),
            error: self.to_string(),
            details: self.details(),
        };
        let mut response = MockResponse::new(self.status(no_match_status));
        // Serializing plain strings cannot fail; fall back to the message alone
        match serde_json::to_vec(&body) {
            Ok(json) => {
                response
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response.body = json.into();
            }
            Err(_) => response.body = body.error.into(),
        }
        response
    }
}

/// Routes requests to mocks and builds their responses.
///
/// The dispatcher owns nothing global: its store, HTTP client and random
/// source are per instance, so several dispatchers can live in one process.
pub struct Dispatcher {
    store: Arc<dyn MockStore>,
    settings: DispatchSettings,
    client: reqwest::Client,
    rng: Mutex<StdRng>,
}

impl Dispatcher {
    /// Create a dispatcher over a store.
    ///
    /// # Parameters
    ///
    /// - `store` - Store holding the mocks
    /// - `settings` - CORS, no-match and forwarding settings
    ///
    /// # Returns
    ///
    /// Returns a dispatcher with an entropy-seeded random source and a
    /// forwarding client that does not follow redirects.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the forwarding client cannot be built.
    pub fn new(store: Arc<dyn MockStore>, settings: DispatchSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            settings,
            client: forwarding_client()?,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Replace the random source, e.g. with a seeded one for reproducible tests.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Replace the HTTP client used by forwarding replies.
    ///
    /// The client's redirect policy decides whether upstream `3xx` answers
    /// are relayed or followed.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn store(&self) -> &Arc<dyn MockStore> {
        &self.store
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Register a mock in the dispatcher's store.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the mock's reply is misconfigured.
    pub fn register(&self, mock: Mock) -> Result<MockHandle, ConfigError> {
        let mock = self.store.register(mock)?;
        Ok(MockHandle::new(mock, Arc::downgrade(&self.store)))
    }

    /// Handle one request end to end.
    ///
    /// Dropping the returned future cancels the request, including any
    /// forwarding call in flight; the mock's counter is then left untouched.
    pub async fn dispatch(&self, request: MockRequest) -> MockResponse {
        if let Some(cors) = &self.settings.cors {
            if cors.is_preflight(&request) {
                debug!("preflight {} answered by CORS policy", request.path);
                return cors.preflight(&request);
            }
        }

        let mut response = match self.try_dispatch(&request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    DispatchError::NoMatch { .. } => debug!("{}", err),
                    _ => warn!("{}: {:?}", err, err.details()),
                }
                err.to_response(self.settings.no_match_status)
            }
        };

        if let Some(cors) = &self.settings.cors {
            cors.apply(&request, &mut response);
        }
        response
    }

    /// Match a request and build the reply, without rendering failures.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` when no mock matches, matchers fail to
    /// evaluate, or the reply cannot be built.
    pub async fn try_dispatch(&self, request: &MockRequest) -> Result<MockResponse, DispatchError> {
        let mock = match self.store.find_match(request, self.settings.fail_fast) {
            MatchResult::Matched(mock) => mock,
            MatchResult::Unmatched { failures, .. } if !failures.is_empty() => {
                return Err(DispatchError::MatchEvaluation { failures });
            }
            MatchResult::Unmatched { closest, .. } => {
                return Err(DispatchError::NoMatch {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                    closest,
                });
            }
        };

        let ctx = ReplyContext {
            client: &self.client,
            rng: &self.rng,
            forward_timeout: self.settings.forward_timeout,
        };
        let response = mock
            .reply()
            .build(request, &mock, &ctx)
            .await
            .map_err(|source| DispatchError::Reply { mock: mock.id(), source })?;

        let calls = mock.record_call();
        debug!(
            "{} answered {} {} with {} (call {})",
            mock, request.method, request.path, response.status, calls
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderName, Method};
    use bytes::Bytes;

    use crate::matchers::JsonEqualTo;
    use crate::reply::{ForwardReply, RandomReply, Reply, StaticReply};
    use crate::request::Selector;
    use crate::store::MemoryStore;

    use super::*;

    fn dispatcher(settings: DispatchSettings) -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryStore::new()), settings)
            .expect("forwarding client")
            .with_rng(StdRng::seed_from_u64(3))
    }

    fn body_json(response: &MockResponse) -> serde_json::Value {
        serde_json::from_slice(&response.body).expect("JSON body")
    }

    fn get(path: &str) -> MockRequest {
        MockRequest::new(Method::GET, path)
    }

    async fn spawn_upstream(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve upstream");
        });
        format!("http://{addr}")
    }

    /// Test the first registered of two overlapping mocks wins.
    #[tokio::test]
    async fn test_first_registered_wins() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let reply = |body: &'static str| StaticReply::new(StatusCode::OK).body(body);
        let first = dispatcher
            .register(Mock::request(Method::GET, "/test").reply(reply("first")))
            .expect("valid mock");
        let second = dispatcher
            .register(Mock::request(Method::GET, "/test").reply(reply("second")))
            .expect("valid mock");

        let response = dispatcher.dispatch(get("/test")).await;
        assert_eq!(response.body, Bytes::from_static(b"first"));
        first.assert_calls(1);
        second.assert_not_called();
    }

    /// Test the call counter only moves for fully matching requests.
    #[tokio::test]
    async fn test_counter_semantics() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let handle = dispatcher
            .register(
                Mock::request(Method::POST, "/items")
                    .body("payload")
                    .reply(Reply::status(StatusCode::CREATED)),
            )
            .expect("valid mock");

        let miss = MockRequest::new(Method::POST, "/items").with_body("other");
        assert_eq!(dispatcher.dispatch(miss).await.status, DEFAULT_NO_MATCH_STATUS);
        assert!(handle.is_called_times(0));

        for _ in 0..3 {
            let hit = MockRequest::new(Method::POST, "/items").with_body("payload");
            assert_eq!(dispatcher.dispatch(hit).await.status, StatusCode::CREATED);
        }
        assert!(handle.is_called_times(3));
    }

    /// Test the no-match response is configurable and explains the closest mock.
    #[tokio::test]
    async fn test_no_match_response() {
        let settings =
            DispatchSettings { no_match_status: StatusCode::NOT_FOUND, ..Default::default() };
        let dispatcher = dispatcher(settings);
        dispatcher
            .register(Mock::request(Method::GET, "/users").named("users").reply(Reply::ok()))
            .expect("valid mock");

        let response = dispatcher.dispatch(get("/orders")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");

        let json = body_json(&response);
        assert_eq!(json["status"], "error");
        assert_eq!(json["errorType"], "no_match");
        assert_eq!(json["error"], "no mock matched GET /orders");
        assert!(json["details"][0].as_str().expect("detail").contains("users"));
    }

    /// Test matcher evaluation failures surface as a 500 with diagnostics.
    #[tokio::test]
    async fn test_match_evaluation_failure() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let handle = dispatcher
            .register(
                Mock::request(Method::POST, "/json")
                    .and(Selector::Body, JsonEqualTo::new(serde_json::json!({"a": 1})))
                    .reply(Reply::ok()),
            )
            .expect("valid mock");

        let request = MockRequest::new(Method::POST, "/json").with_body("{oops");
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(&response);
        assert_eq!(json["errorType"], "match_evaluation");
        assert!(json["details"][0].as_str().expect("detail").contains("not valid JSON"));
        handle.assert_not_called();
    }

    /// Test a failing reply leaves the counter untouched.
    #[tokio::test]
    async fn test_reply_failure_does_not_count() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local address");
        drop(listener);

        let reply = ForwardReply::new(format!("http://{addr}"));
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/down").reply(reply))
            .expect("valid mock");

        let response = dispatcher.dispatch(get("/down")).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(&response)["errorType"], "upstream_unreachable");
        handle.assert_not_called();
    }

    /// Test forwards without their own timeout use the dispatcher default and answer 504.
    #[tokio::test]
    async fn test_forward_uses_default_timeout() {
        let upstream = spawn_upstream(axum::Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }))
        .await;

        let settings =
            DispatchSettings { forward_timeout: Duration::from_millis(100), ..Default::default() };
        let dispatcher = dispatcher(settings);
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/slow").reply(ForwardReply::new(upstream)))
            .expect("valid mock");

        let started = std::time::Instant::now();
        let response = dispatcher.dispatch(get("/slow")).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(&response)["errorType"], "upstream_timeout");
        handle.assert_not_called();
    }

    /// Test forwards go through a client supplied by the caller.
    #[tokio::test]
    async fn test_with_client() {
        let upstream = spawn_upstream(axum::Router::new().fallback(|headers: HeaderMap| async move {
            headers
                .get("x-client")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("default")
                .to_string()
        }))
        .await;

        let mut default_headers = HeaderMap::new();
        default_headers.insert("x-client", HeaderValue::from_static("custom"));
        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .expect("client");

        let dispatcher = dispatcher(DispatchSettings::default()).with_client(client);
        dispatcher
            .register(Mock::request(Method::GET, "/who").reply(ForwardReply::new(upstream)))
            .expect("valid mock");

        let response = dispatcher.dispatch(get("/who")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"custom"));
    }

    /// Test preflight short-circuits matching while other methods reach the mocks.
    #[tokio::test]
    async fn test_cors_preflight_then_get() {
        let settings = DispatchSettings { cors: Some(CorsPolicy::default()), ..Default::default() };
        let dispatcher = dispatcher(settings);
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/test").reply(Reply::ok()))
            .expect("valid mock");

        let preflight = dispatcher.dispatch(MockRequest::new(Method::OPTIONS, "/test")).await;
        assert_eq!(preflight.status, StatusCode::NO_CONTENT);
        assert!(preflight.body.is_empty());
        handle.assert_not_called();

        let origin = HeaderValue::from_static("http://localhost:3000");
        let response = dispatcher.dispatch(get("/test").with_header(header::ORIGIN, origin)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        handle.assert_calls(1);
    }

    /// Test OPTIONS requests are matched normally without a CORS policy.
    #[tokio::test]
    async fn test_options_without_cors() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let response = dispatcher.dispatch(MockRequest::new(Method::OPTIONS, "/test")).await;
        assert_eq!(response.status, DEFAULT_NO_MATCH_STATUS);
    }

    /// Test random replies reach every sub-reply through the dispatcher.
    #[tokio::test]
    async fn test_random_reply_distribution() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let reply = RandomReply::new()
            .add(Reply::status(StatusCode::OK))
            .add(Reply::status(StatusCode::CREATED))
            .add(Reply::status(StatusCode::ACCEPTED));
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/random").reply(reply))
            .expect("valid mock");

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(dispatcher.dispatch(get("/random")).await.status);
        }
        assert_eq!(seen.len(), 3);
        handle.assert_calls(200);
    }

    /// Test separate dispatchers never share mocks.
    #[tokio::test]
    async fn test_instances_are_isolated() {
        let a = dispatcher(DispatchSettings::default());
        let b = dispatcher(DispatchSettings::default());
        a.register(Mock::request(Method::GET, "/only-a").reply(Reply::ok())).expect("valid mock");

        assert_eq!(a.dispatch(get("/only-a")).await.status, StatusCode::OK);
        assert_eq!(b.dispatch(get("/only-a")).await.status, DEFAULT_NO_MATCH_STATUS);
    }

    /// Test disabling, enabling and removing a mock through its handle.
    #[tokio::test]
    async fn test_handle_remove_and_disable() {
        let dispatcher = dispatcher(DispatchSettings::default());
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/h").reply(Reply::ok()))
            .expect("valid mock");

        handle.disable();
        assert_eq!(dispatcher.dispatch(get("/h")).await.status, DEFAULT_NO_MATCH_STATUS);
        handle.enable();
        assert_eq!(dispatcher.dispatch(get("/h")).await.status, StatusCode::OK);

        assert!(handle.remove());
        assert!(dispatcher.store().is_empty());
        handle.assert_calls(1);
    }

    /// Test a caller deadline cancels an in-flight forward without counting the call.
    #[tokio::test]
    async fn test_cancellation_aborts_forward() {
        let upstream = spawn_upstream(axum::Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }))
        .await;

        let dispatcher = dispatcher(DispatchSettings::default());
        let handle = dispatcher
            .register(Mock::request(Method::GET, "/slow").reply(ForwardReply::new(upstream)))
            .expect("valid mock");

        let deadline = Duration::from_millis(100);
        let outcome = tokio::time::timeout(deadline, dispatcher.dispatch(get("/slow"))).await;
        assert!(outcome.is_err());
        handle.assert_not_called();
    }

    /// Test concurrent registrations and dispatches keep counters exact.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch() {
        let dispatcher = Arc::new(dispatcher(DispatchSettings::default()));
        let shared = dispatcher
            .register(Mock::request(Method::GET, "/shared").reply(Reply::ok()))
            .expect("valid mock");

        let mut tasks = Vec::new();
        for i in 0..200 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                let path = format!("/own/{i}");
                let own = dispatcher
                    .register(Mock::request(Method::GET, path.clone()).reply(Reply::ok()))
                    .expect("valid mock");
                let shared = dispatcher.dispatch(get("/shared")).await;
                let mine = dispatcher.dispatch(get(&path)).await;
                assert_eq!(shared.status, StatusCode::OK);
                assert_eq!(mine.status, StatusCode::OK);
                own.assert_calls(1);
            }));
        }
        for task in tasks {
            task.await.expect("task finished");
        }

        shared.assert_calls(200);
        assert_eq!(dispatcher.store().len(), 201);
    }

    /// Test custom headers survive into dispatched static replies.
    #[tokio::test]
    async fn test_static_headers_roundtrip() {
        let dispatcher = dispatcher(DispatchSettings::default());
        dispatcher
            .register(
                Mock::request(Method::GET, "/h")
                    .reply(StaticReply::new(StatusCode::OK).header("X-Mock", "yes")),
            )
            .expect("valid mock");

        let response = dispatcher.dispatch(get("/h")).await;
        assert_eq!(response.headers[HeaderName::from_static("x-mock")], "yes");
    }
}
