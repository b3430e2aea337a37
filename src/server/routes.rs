//! Router configuration for the web server.

use axum::http::{header, HeaderName, Method};
use axum::handler::Handler;
use axum::routing::{get, MethodRouter};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use super::AppState;

/// Request headers browsers may send cross-origin.
const ALLOWED_HEADERS: [HeaderName; 9] = [
    HeaderName::from_static("x-csrf-token"),
    HeaderName::from_static("x-requested-with"),
    header::ACCEPT,
    HeaderName::from_static("accept-version"),
    header::CONTENT_LENGTH,
    HeaderName::from_static("content-md5"),
    header::CONTENT_TYPE,
    header::DATE,
    HeaderName::from_static("x-api-version"),
];

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::OPTIONS,
            Method::PATCH,
            Method::DELETE,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(ALLOWED_HEADERS)
}

/// GET handler plus a bare 200 for OPTIONS and a JSON 405 for the rest.
fn extract_route<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler)
        .options(handlers::preflight)
        .fallback(handlers::method_not_allowed)
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/mediafire", extract_route(handlers::extract_file_locker))
        .route("/api/pinterest", extract_route(handlers::extract_pin))
        .route("/api/pin", extract_route(handlers::extract_pin))
        .layer(ServiceBuilder::new().layer(cors_layer()))
        .with_state(state)
}
