pub mod connection_history;
pub mod ports;
pub mod sync;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ErrorKind, SyncError};
use crate::AppState;

/// Error response body: `{"kind": "...", "error": "message"}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::Validation,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.kind, self.message))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{"kind","error"}` error body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::TransientStore => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::FatalStore => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), "Request failed: {}", err);
        }
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

/// Healthcheck endpoint, also verifies the database answers
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "rack-sync",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
