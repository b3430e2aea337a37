//! HTTP request handlers for the web server.

mod extract;
mod helpers;

pub use extract::{extract_file_locker, extract_pin};
pub use helpers::ApiResponse;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Non-CORS OPTIONS requests get an empty 200.
pub async fn preflight() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn method_not_allowed() -> Response {
    ApiResponse::error("Method not allowed").into_response_with(StatusCode::METHOD_NOT_ALLOWED)
}
