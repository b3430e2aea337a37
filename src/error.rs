//! Extraction error kinds.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Could not resolve link to a supported page: {0}")]
    ResolutionFailed(String),
    #[error("Could not retrieve the page: {0}")]
    RetrievalFailed(String),
    #[error("No media URL found on the page: {0}")]
    ExtractionIncomplete(String),
    #[error("Could not decode download link: {0}")]
    DecodeFailed(String),
    #[error("Download link is not reachable: {0}")]
    VerificationFailed(String),
    #[error("Upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),
    #[error("Too many requests in flight, try again shortly")]
    TooManyRequests,
    #[error("File is no longer available: {0}")]
    FileUnavailable(String),
}

impl ExtractError {
    /// Whether the retry controller should run the pipeline again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::RetrievalFailed(_)
                | ExtractError::ExtractionIncomplete(_)
                | ExtractError::VerificationFailed(_)
        )
    }

    /// HTTP status reported to callers for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExtractError::InvalidUrl(_) | ExtractError::ResolutionFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            ExtractError::ExtractionIncomplete(_) | ExtractError::FileUnavailable(_) => {
                StatusCode::NOT_FOUND
            }
            ExtractError::UpstreamTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ExtractError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ExtractError::RetrievalFailed(_)
            | ExtractError::DecodeFailed(_)
            | ExtractError::VerificationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::InvalidUrl(_) => "invalid_url",
            ExtractError::ResolutionFailed(_) => "resolution_failed",
            ExtractError::RetrievalFailed(_) => "retrieval_failed",
            ExtractError::ExtractionIncomplete(_) => "extraction_incomplete",
            ExtractError::DecodeFailed(_) => "decode_failed",
            ExtractError::VerificationFailed(_) => "verification_failed",
            ExtractError::UpstreamTimeout(_) => "upstream_timeout",
            ExtractError::TooManyRequests => "too_many_requests",
            ExtractError::FileUnavailable(_) => "file_unavailable",
        }
    }
}
