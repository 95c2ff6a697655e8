//! Error handling with RFC 7807 Problem Details for JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use taskhub_tracker::TrackerError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Validation { .. } => Self::BadRequest(err.to_string()),
            TrackerError::Unauthorized(_) => Self::Unauthorized(err.to_string()),
            TrackerError::Forbidden { .. } | TrackerError::NotAllowed { .. } => {
                Self::Forbidden(err.to_string())
            }
            TrackerError::NotFound { .. } => Self::NotFound(err.to_string()),
            TrackerError::Conflict(_) => Self::Conflict(err.to_string()),
            TrackerError::Persistence(_) => {
                tracing::error!(error = %err, "Storage failure while serving request");
                Self::Internal("storage failure".to_string())
            }
        }
    }
}

/// RFC 7807 Problem Details for HTTP APIs
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    problem_type: String,
    title: String,
    status: u16,
    detail: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: "about:blank".to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let title = status
            .canonical_reason()
            .map_or_else(|| "Error".to_string(), ToString::to_string);

        Self::new(status, title, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse::from_error(&self);
        let mut response = (status, Json(response)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
