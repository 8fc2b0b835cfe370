//! Catch-all handler feeding every request into the dispatcher.

use std::error::Error as _;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};

use crate::http::state::AppState;
use crate::request::MockRequest;

/// Handle any request by matching it against registered mocks.
///
/// # Parameters
///
/// - `state` - Application state with the dispatcher and body limit
/// - `request` - Incoming HTTP request
///
/// # Returns
///
/// Returns the reply of the matching mock, the configured no-match response,
/// HTTP 413 when the body exceeds the limit, or HTTP 400 when the body cannot
/// be read.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) if exceeds_limit(&e) => {
            let limit = state.body_limit;
            warn!(method = %parts.method, uri = %parts.uri, "request body over {limit} bytes");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
        Err(e) => {
            warn!(method = %parts.method, uri = %parts.uri, "failed to read request body: {e}");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let request = MockRequest::from_parts(&parts, body);
    debug!(method = %request.method, target = %request.path_and_query(), "dispatching request");

    state.dispatcher.dispatch(request).await.into_response()
}

/// Whether a body read failed because the size limit was hit.
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
