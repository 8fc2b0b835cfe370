//! HTTP routing configuration.

use axum::Router;

use crate::http::handlers::dispatch;
use crate::http::state::AppState;

/// Build the Axum router.
///
/// Mocks can live on any path, so every request goes through the fallback
/// handler into the dispatcher.
///
/// # Parameters
///
/// - `state` - Application state containing the dispatcher
///
/// # Returns
///
/// Returns configured Axum `Router`.
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}
