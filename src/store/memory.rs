//! In-memory mock storage implementation.
//!
//! Mocks are kept in a single vector already sorted in matching order, so the
//! read path never sorts and writers pay the insertion cost instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::ConfigError;
use crate::mock::{Mock, MockId};
use crate::request::MockRequest;
use crate::store::{search, MatchResult, MockStore};

/// In-memory store guarded by a reader-writer lock.
pub struct MemoryStore {
    /// Mocks ordered by priority (descending) then registration order
    mocks: RwLock<Vec<Arc<Mock>>>,
    /// Next id handed out on registration
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    ///
    /// # Returns
    /// Returns a new `MemoryStore` instance with no mocks.
    pub fn new() -> Self {
        Self { mocks: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
    }
}

impl MockStore for MemoryStore {
    fn register(&self, mut mock: Mock) -> Result<Arc<Mock>, ConfigError> {
        mock.validate()?;
        mock.assign_id(MockId(self.next_id.fetch_add(1, Ordering::SeqCst)));
        let mock = Arc::new(mock);

        {
            let mut mocks = self.mocks.write().unwrap_or_else(PoisonError::into_inner);
            // After every mock of the same or higher priority
            let pos =
                mocks.iter().position(|m| m.priority() < mock.priority()).unwrap_or(mocks.len());
            mocks.insert(pos, Arc::clone(&mock));
        }

        debug!("registered {} with priority {}", mock, mock.priority());
        Ok(mock)
    }

    fn remove(&self, id: MockId) -> bool {
        let mut mocks = self.mocks.write().unwrap_or_else(PoisonError::into_inner);
        let before = mocks.len();
        mocks.retain(|m| m.id() != id);
        let removed = mocks.len() != before;
        if removed {
            debug!("removed mock {}", id);
        }
        removed
    }

    fn reset(&self) {
        let mut mocks = self.mocks.write().unwrap_or_else(PoisonError::into_inner);
        debug!("reset store, dropping {} mocks", mocks.len());
        mocks.clear();
    }

    fn find_match(&self, request: &MockRequest, fail_fast: bool) -> MatchResult {
        let mocks = self.mocks.read().unwrap_or_else(PoisonError::into_inner);
        search(mocks.iter(), request, fail_fast)
    }

    fn mocks(&self) -> Vec<Arc<Mock>> {
        self.mocks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn len(&self) -> usize {
        self.mocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
