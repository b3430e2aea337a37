//! Response envelope shared by the API handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ExtractError;
use crate::models::MediaRecord;

/// `{ success, data?, error?, cached?, retry?, retryUrl? }`
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MediaRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_url: Option<String>,
}

impl ApiResponse {
    pub fn ok(record: MediaRecord, cached: bool) -> Self {
        Self {
            success: true,
            data: Some(record),
            cached: Some(cached),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Tell the caller to come back later with `retry_url`.
    pub fn in_progress(retry: u32, retry_url: String) -> Self {
        Self {
            success: false,
            error: Some("Extraction already in progress, retry shortly".to_string()),
            retry: Some(retry),
            retry_url: Some(retry_url),
            ..Self::default()
        }
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        self.into_response_with(StatusCode::OK)
    }
}

impl From<ExtractError> for ApiResponse {
    fn from(error: ExtractError) -> Self {
        Self::error(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_omits_empty_fields() {
        let json = serde_json::to_value(ApiResponse::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_in_progress_envelope() {
        let json =
            serde_json::to_value(ApiResponse::in_progress(2, "/api/pin?url=x&retry=2".into()))
                .unwrap();
        assert_eq!(json["retry"], 2);
        assert_eq!(json["retryUrl"], "/api/pin?url=x&retry=2");
        assert_eq!(json["success"], false);
    }
}
