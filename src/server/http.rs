//! HTTP endpoints
//!
//! `POST /upload-screenshot` is a second way into the screenshot fan-out that
//! skips the helper role check. `GET /proxy-image` fetches a remote image on
//! the caller's behalf.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, ApiResult, AppState};

/// Content type assumed when the upstream omits one
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Body of `POST /upload-screenshot`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub question_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub success: bool,
}

/// Query of `GET /proxy-image`
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub async fn upload_screenshot(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let Json(request) = payload?;

    let screenshot = request.screenshot.filter(|s| !s.is_empty());
    let question_id = request.question_id.filter(|q| !q.is_empty());
    let (Some(screenshot), Some(question_id)) = (screenshot, question_id) else {
        return Err(ApiError::Validation(
            "Missing screenshot or questionId".to_string(),
        ));
    };

    let report = state
        .relay
        .publish_screenshot(&question_id, &screenshot)
        .await?;
    debug!(
        "Uploaded screenshot {} delivered to {} receiver(s)",
        question_id, report.delivered
    );

    Ok(Json(UploadResponse { success: true }))
}

pub async fn proxy_image(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ApiResult<Response> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or(ApiError::MissingUrl)?;

    debug!("Proxying image from {}", url);
    let upstream = state
        .http_client
        .get(&url)
        .send()
        .await?
        .error_for_status()?;

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_IMAGE_CONTENT_TYPE));
    let body = upstream.bytes().await?;

    Ok(([(CONTENT_TYPE, content_type)], body).into_response())
}
