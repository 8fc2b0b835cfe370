//! Application state and configuration for the HTTP server.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cors::CorsPolicy;
use crate::dispatcher::{
    DispatchSettings, Dispatcher, DEFAULT_FORWARD_TIMEOUT, DEFAULT_NO_MATCH_STATUS,
};
use crate::store::{MemoryStore, MockStore};

/// Default maximum accepted request body (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher owning this server's mocks
    pub dispatcher: Arc<Dispatcher>,
    /// Maximum request body size read before dispatching
    pub body_limit: usize,
}

impl AppState {
    /// Create new application state around a dispatcher.
    ///
    /// # Parameters
    ///
    /// - `dispatcher` - Dispatcher handling every request
    /// - `body_limit` - Maximum request body size in bytes
    ///
    /// # Returns
    ///
    /// Returns configured `AppState` instance.
    pub fn new(dispatcher: Dispatcher, body_limit: usize) -> Self {
        Self { dispatcher: Arc::new(dispatcher), body_limit }
    }

    /// Get a builder for configuring application state step by step.
    ///
    /// # Returns
    ///
    /// Returns an `AppStateBuilder` for fluent configuration.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Builder for constructing AppState with fluent interface.
#[derive(Default)]
pub struct AppStateBuilder {
    store: Option<Arc<dyn MockStore>>,
    cors: Option<CorsPolicy>,
    no_match_status: Option<StatusCode>,
    forward_timeout: Option<Duration>,
    seed: Option<u64>,
    fail_fast: bool,
    body_limit: Option<usize>,
}

impl AppStateBuilder {
    /// Create a new builder with default values.
    ///
    /// # Returns
    ///
    /// Returns a new `AppStateBuilder` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store implementation. An empty [`MemoryStore`] is used otherwise.
    ///
    /// # Parameters
    ///
    /// - `store` - Store to register mocks in
    ///
    /// # Returns
    ///
    /// Returns the builder for method chaining.
    pub fn with_store(mut self, store: Arc<dyn MockStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Enable CORS preflight handling with the given policy.
    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Set the status returned when no mock matches.
    pub fn with_no_match_status(mut self, status: StatusCode) -> Self {
        self.no_match_status = Some(status);
        self
    }

    /// Set the default timeout for forwarding replies.
    ///
    /// # Parameters
    ///
    /// - `timeout` - Maximum time to wait for an upstream
    ///
    /// # Returns
    ///
    /// Returns the builder for method chaining.
    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    /// Seed the random source used by random replies.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Stop matching at the first matcher evaluation failure.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the maximum request body size.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    /// Build the final AppState with validation.
    ///
    /// # Returns
    ///
    /// Returns `Ok(AppState)` if valid.
    ///
    /// # Errors
    ///
    /// Returns error if the forward timeout is zero, the CORS policy
    /// contains values that cannot be sent as headers, or the forwarding
    /// client cannot be created.
    pub fn build(self) -> io::Result<AppState> {
        let forward_timeout = self.forward_timeout.unwrap_or(DEFAULT_FORWARD_TIMEOUT);
        if forward_timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Forward timeout must be greater than zero",
            ));
        }

        if let Some(cors) = &self.cors {
            cors.validate().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        }

        let settings = DispatchSettings {
            cors: self.cors,
            no_match_status: self.no_match_status.unwrap_or(DEFAULT_NO_MATCH_STATUS),
            forward_timeout,
            fail_fast: self.fail_fast,
        };

        // Use defaults for optional values
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let mut dispatcher = Dispatcher::new(store, settings).map_err(io::Error::other)?;
        if let Some(seed) = self.seed {
            dispatcher = dispatcher.with_rng(StdRng::seed_from_u64(seed));
        }

        Ok(AppState::new(dispatcher, self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT)))
    }
}
