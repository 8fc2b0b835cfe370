//! Conversions between the engine's response model and Axum responses.

use axum::body::Body;
use axum::response::{IntoResponse, Response};

use crate::request::MockResponse;

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
