//! Extraction endpoints.

use axum::{
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use super::super::AppState;
use super::helpers::ApiResponse;
use crate::config::parse_bool;
use crate::models::{ExtractionRequest, Source, StrategyHint};
use crate::pipeline::Outcome;

/// Query parameters accepted by the extraction endpoints. Everything is
/// read as text so a malformed value gets a JSON error, not a rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractParams {
    pub url: Option<String>,
    pub retry: Option<String>,
    pub force: Option<String>,
    pub method: Option<String>,
}

impl ExtractParams {
    fn into_request(self) -> Result<ExtractionRequest, String> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| "Missing required url parameter".to_string())?;

        let hint = match self.method.as_deref() {
            None => StrategyHint::Auto,
            Some(method) => StrategyHint::from_str(method)
                .ok_or_else(|| format!("Unknown method: {}", method))?,
        };
        let attempt = self
            .retry
            .as_deref()
            .and_then(|r| r.trim().parse().ok())
            .unwrap_or(0);
        let force = self
            .force
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false);

        Ok(ExtractionRequest::new(url.trim())
            .with_hint(hint)
            .with_attempt(attempt)
            .with_force(force))
    }
}

pub async fn extract_file_locker(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<ExtractParams>,
) -> Response {
    run(state, Source::FileLocker, uri.path(), params).await
}

pub async fn extract_pin(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<ExtractParams>,
) -> Response {
    run(state, Source::Pin, uri.path(), params).await
}

async fn run(state: AppState, source: Source, path: &str, params: ExtractParams) -> Response {
    let request = match params.into_request() {
        Ok(request) => request,
        Err(message) => {
            return ApiResponse::error(message).into_response_with(StatusCode::BAD_REQUEST);
        }
    };

    match state.service.extract(source, &request).await {
        Ok(Outcome::Fresh { record, .. }) => ApiResponse::ok(record, false).into_response(),
        Ok(Outcome::Cached(record)) => ApiResponse::ok(record, true).into_response(),
        Ok(Outcome::InProgress { retry }) => {
            ApiResponse::in_progress(retry, retry_url(path, &request, retry))
                .into_response_with(StatusCode::ACCEPTED)
        }
        Err(e) => {
            warn!("{} extraction failed for {}: {}", source, request.source_url, e);
            ApiResponse::from(e.clone()).into_response_with(e.status_code())
        }
    }
}

/// Same query with `retry` bumped.
fn retry_url(path: &str, request: &ExtractionRequest, retry: u32) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("url", &request.source_url);
    query.append_pair("retry", &retry.to_string());
    if request.strategy_hint != StrategyHint::Auto {
        query.append_pair("method", request.strategy_hint.as_str());
    }
    if request.force {
        query.append_pair("force", "true");
    }
    format!("{}?{}", path, query.finish())
}
