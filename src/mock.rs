//! Mocks: matcher chains bound to a reply, plus the handle used for call assertions.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use axum::http::Method;

use crate::error::ConfigError;
use crate::matchers::{EqualTo, EqualToIgnoreCase, MatchOutcome, Matcher, Params, PathMatcher};
use crate::reply::Reply;
use crate::request::{MockRequest, Selector};
use crate::store::MockStore;
use crate::value::Value;

/// Identifier assigned to a mock when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MockId(pub u64);

impl fmt::Display for MockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step of a mock's matcher chain.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub selector: Selector,
    pub matcher: Arc<dyn Matcher>,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.selector, self.matcher.describe())
    }
}

/// Outcome of running a request through a mock's matcher chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Matched,
    /// The expectation at `position` did not match; all earlier ones did.
    NotMatched { position: usize },
    /// The expectation at `position` failed to evaluate.
    Failed { position: usize, detail: String },
}

/// A registered expectation: an ordered matcher chain bound to one reply.
#[derive(Debug)]
pub struct Mock {
    id: MockId,
    name: Option<String>,
    expectations: Vec<Expectation>,
    reply: Reply,
    priority: i32,
    enabled: AtomicBool,
    calls: AtomicUsize,
}

impl Mock {
    /// Start building a mock with its first expectation.
    ///
    /// # Parameters
    ///
    /// - `selector` - Part of the request to inspect
    /// - `matcher` - Matcher applied to the selected value
    ///
    /// # Returns
    ///
    /// Returns a `MockBuilder` for adding further expectations and the reply.
    pub fn given(selector: Selector, matcher: impl Matcher + 'static) -> MockBuilder {
        MockBuilder::new().and(selector, matcher)
    }

    /// Start building a mock that matches on nothing but method and path.
    pub fn request(method: Method, path: impl Into<String>) -> MockBuilder {
        MockBuilder::new().method(method).path(path)
    }

    pub fn id(&self) -> MockId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Number of requests this mock has successfully answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Run the matcher chain against a request.
    ///
    /// Expectations are evaluated in order with a fresh [`Params`] and the
    /// chain stops at the first expectation that does not match or fails.
    pub fn evaluate(&self, request: &MockRequest) -> ChainOutcome {
        let mut params = Params::default();
        for (position, expectation) in self.expectations.iter().enumerate() {
            let actual = expectation.selector.select(request);
            match expectation.matcher.evaluate(actual.as_ref(), &mut params) {
                MatchOutcome::Matched => {}
                MatchOutcome::NotMatched => return ChainOutcome::NotMatched { position },
                MatchOutcome::Failed(detail) => return ChainOutcome::Failed { position, detail },
            }
        }
        ChainOutcome::Matched
    }

    /// Check the mock can be registered.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found in the reply.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reply.validate()
    }

    pub(crate) fn assign_id(&mut self, id: MockId) {
        self.id = id;
    }

    pub(crate) fn record_call(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl fmt::Display for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "mock {} ({name})", self.id),
            None => write!(f, "mock {}", self.id),
        }
    }
}

/// Builder for [`Mock`]s.
#[derive(Debug)]
pub struct MockBuilder {
    name: Option<String>,
    expectations: Vec<Expectation>,
    priority: i32,
    enabled: bool,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuilder {
    pub fn new() -> Self {
        Self { name: None, expectations: Vec::new(), priority: 0, enabled: true }
    }

    /// Append an expectation to the chain.
    pub fn and(mut self, selector: Selector, matcher: impl Matcher + 'static) -> Self {
        self.expectations.push(Expectation { selector, matcher: Arc::new(matcher) });
        self
    }

    /// Append an expectation with an already shared matcher.
    pub fn and_shared(mut self, selector: Selector, matcher: Arc<dyn Matcher>) -> Self {
        self.expectations.push(Expectation { selector, matcher });
        self
    }

    pub fn method(self, method: Method) -> Self {
        self.and(Selector::Method, EqualToIgnoreCase::new(method.as_str()))
    }

    pub fn path(self, path: impl Into<String>) -> Self {
        self.and(Selector::Path, PathMatcher::exact(path))
    }

    pub fn header(self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.and(Selector::header(name), EqualTo::new(value))
    }

    pub fn query(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Selector::query(name), EqualTo::new(value))
    }

    pub fn body(self, body: impl Into<Value>) -> Self {
        self.and(Selector::Body, EqualTo::new(body))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Higher priorities are tried first; equal priorities keep registration order.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Bind the chain to a reply and produce the mock.
    pub fn reply(self, reply: impl Into<Reply>) -> Mock {
        Mock {
            id: MockId::default(),
            name: self.name,
            expectations: self.expectations,
            reply: reply.into(),
            priority: self.priority,
            enabled: AtomicBool::new(self.enabled),
            calls: AtomicUsize::new(0),
        }
    }
}

/// Handle returned when a mock is registered.
///
/// It observes the mock's call counter and can switch the mock on and off or
/// remove it from the store it was registered in.
#[derive(Clone)]
pub struct MockHandle {
    mock: Arc<Mock>,
    store: Weak<dyn MockStore>,
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHandle").field("mock", &self.mock).finish_non_exhaustive()
    }
}

impl MockHandle {
    pub(crate) fn new(mock: Arc<Mock>, store: Weak<dyn MockStore>) -> Self {
        Self { mock, store }
    }

    pub fn id(&self) -> MockId {
        self.mock.id()
    }

    pub fn mock(&self) -> &Arc<Mock> {
        &self.mock
    }

    pub fn calls(&self) -> usize {
        self.mock.calls()
    }

    pub fn is_called_times(&self, times: usize) -> bool {
        self.calls() == times
    }

    pub fn enable(&self) {
        self.mock.set_enabled(true);
    }

    pub fn disable(&self) {
        self.mock.set_enabled(false);
    }

    /// Remove the mock from its store.
    ///
    /// # Returns
    ///
    /// Returns `true` if the mock was still registered.
    pub fn remove(&self) -> bool {
        self.store.upgrade().is_some_and(|store| store.remove(self.mock.id()))
    }

    /// Panic unless the mock answered at least one request.
    #[track_caller]
    pub fn assert_called(&self) {
        assert!(self.calls() > 0, "expected {} to be called, but it was not", self.mock);
    }

    #[track_caller]
    pub fn assert_not_called(&self) {
        assert_eq!(self.calls(), 0, "expected {} not to be called", self.mock);
    }

    /// Panic unless the mock answered exactly `times` requests.
    #[track_caller]
    pub fn assert_calls(&self, times: usize) {
        assert_eq!(self.calls(), times, "unexpected number of calls for {}", self.mock);
    }
}
