//! HTTP error responses

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::ProtocolError;

/// Errors surfaced by the HTTP endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or empty required fields; rendered as a JSON error
    #[error("{0}")]
    Validation(String),

    /// Body could not be read as JSON
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// Proxy request without a `url` parameter; rendered as plain text
    #[error("URL parameter is required")]
    MissingUrl,

    /// Image proxy target unreachable or returned an error status
    #[error("Upstream fetch failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Anything else that went wrong while handling the request
    #[error("Internal error: {0}")]
    Internal(#[from] ProtocolError),
}

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::InvalidBody(rejection) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response(),
            ApiError::MissingUrl => {
                (StatusCode::BAD_REQUEST, "URL parameter is required").into_response()
            }
            ApiError::Upstream(e) => {
                error!("Proxy error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching image").into_response()
            }
            ApiError::Internal(e) => {
                error!("Upload error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
