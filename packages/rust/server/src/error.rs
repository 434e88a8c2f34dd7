//! HTTP error mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use draftsmith_shared::{DraftsmithError, ErrorKind, Stage, StageError};
use serde::Serialize;
use tracing::{error, warn};

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error rendered as `{ success: false, error, code }`.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("[{status}] [{code}] {message}")]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
    /// Stage that failed, when the error came from the orchestrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl ApiError {
    fn from_kind(kind: ErrorKind, message: String, stage: Option<Stage>) -> Self {
        Self {
            status: status_for(kind),
            message,
            code: kind.code(),
            stage,
        }
    }

    /// 400 with the validation code.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::ValidationFailure, message.into(), None)
    }

    /// 404 with the not-found code.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::NotFoundFailure, message.into(), None)
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
        ErrorKind::NotFoundFailure => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailure => StatusCode::CONFLICT,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::DataIntegrityFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        Self::from_kind(err.kind(), err.error.to_string(), Some(err.stage))
    }
}

impl From<DraftsmithError> for ApiError {
    fn from(err: DraftsmithError) -> Self {
        Self::from_kind(err.kind(), err.to_string(), None)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = self.code, stage = ?self.stage, "{}", self.message);
        } else {
            warn!(status = %self.status, code = self.code, stage = ?self.stage, "{}", self.message);
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message,
            "code": self.code,
            "stage": self.stage,
        }));

        (self.status, body).into_response()
    }
}
