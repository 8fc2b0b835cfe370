//! Mock storage abstractions and implementations.
//!
//! A store owns the mocks registered with one server instance and answers the
//! question "which mock, if any, handles this request". Stores are plain owned
//! values shared through `Arc`, so independent servers never see each
//! other's mocks.

pub mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::mock::{ChainOutcome, Mock, MockId};
use crate::request::MockRequest;

/// Storage abstraction for registered mocks.
///
/// Implementations must allow `find_match` to run concurrently with itself,
/// while `register`, `remove` and `reset` are exclusive with every other
/// operation.
pub trait MockStore: Send + Sync {
    /// Register a mock.
    ///
    /// # Parameters
    ///
    /// - `mock` - Mock to add; its id is assigned by the store
    ///
    /// # Returns
    ///
    /// Returns the shared mock as stored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the mock's reply is misconfigured.
    fn register(&self, mock: Mock) -> Result<Arc<Mock>, ConfigError>;

    /// Remove a mock by id. Returns `true` if it was present.
    fn remove(&self, id: MockId) -> bool;

    /// Remove every mock.
    fn reset(&self);

    /// Find the mock that handles a request.
    ///
    /// # Parameters
    ///
    /// - `request` - Incoming request
    /// - `fail_fast` - Stop the search at the first matcher evaluation failure
    ///
    /// # Returns
    ///
    /// Returns the first enabled mock, by priority then registration order,
    /// whose whole chain matches, or diagnostics when none does.
    fn find_match(&self, request: &MockRequest, fail_fast: bool) -> MatchResult;

    /// Snapshot of the registered mocks in matching order.
    fn mocks(&self) -> Vec<Arc<Mock>>;

    fn len(&self) -> usize {
        self.mocks().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a store lookup.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched(Arc<Mock>),
    Unmatched {
        /// Mocks whose chain got furthest before a matcher rejected the request
        closest: Vec<Mismatch>,
        /// Mocks disqualified because a matcher failed to evaluate
        failures: Vec<EvaluationFailure>,
    },
}

/// Why a mock rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub mock: MockId,
    pub name: Option<String>,
    /// Number of expectations that matched before the failing one
    pub matched: usize,
    /// Description of the expectation that did not match
    pub expectation: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock {}", self.mock)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        write!(f, ": expected {} (after {} matching)", self.expectation, self.matched)
    }
}

/// A matcher failed to evaluate while a mock was considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationFailure {
    pub mock: MockId,
    pub name: Option<String>,
    pub expectation: String,
    pub detail: String,
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock {}", self.mock)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        write!(f, ": {} failed: {}", self.expectation, self.detail)
    }
}

/// Search mocks in the given order.
///
/// Shared by store implementations so every backend applies the same
/// selection and diagnostics rules.
pub fn search<'a>(
    mocks: impl IntoIterator<Item = &'a Arc<Mock>>,
    request: &MockRequest,
    fail_fast: bool,
) -> MatchResult {
    let mut closest: Vec<Mismatch> = Vec::new();
    let mut failures = Vec::new();

    for mock in mocks.into_iter().filter(|m| m.is_enabled()) {
        match mock.evaluate(request) {
            ChainOutcome::Matched => return MatchResult::Matched(Arc::clone(mock)),
            ChainOutcome::NotMatched { position } => {
                let best = closest.first().map_or(0, |m| m.matched);
                if closest.is_empty() || position > best {
                    closest.clear();
                }
                if closest.is_empty() || position == best {
                    closest.push(Mismatch {
                        mock: mock.id(),
                        name: mock.name().map(str::to_string),
                        matched: position,
                        expectation: mock.expectations()[position].to_string(),
                    });
                }
            }
            ChainOutcome::Failed { position, detail } => {
                failures.push(EvaluationFailure {
                    mock: mock.id(),
                    name: mock.name().map(str::to_string),
                    expectation: mock.expectations()[position].to_string(),
                    detail,
                });
                if fail_fast {
                    break;
                }
            }
        }
    }

    MatchResult::Unmatched { closest, failures }
}
