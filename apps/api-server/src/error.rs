//! HTTP error type. Every handler failure becomes
//! `{"error": {"code", "message"[, "issues"]}}` with a matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{LinkError, ValidationIssue};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<ValidationIssue>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Validation {
        message: &'static str,
        issues: Vec<ValidationIssue>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a domain error, using `invalid` as the message for validation
    /// failures.
    pub fn from_link_error(e: LinkError, invalid: &'static str) -> Self {
        match e {
            LinkError::Validation(v) => ApiError::Validation {
                message: invalid,
                issues: v.into_issues(),
            },
            LinkError::SlugAlreadyExists(_) => ApiError::Conflict(e.to_string()),
            LinkError::LinkNotFound(_) | LinkError::SlugNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            LinkError::Repository(_) => ApiError::Internal(e.to_string()),
        }
    }

    fn parts(self) -> (StatusCode, &'static str, String, Option<Vec<ValidationIssue>>) {
        match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m, None),
            ApiError::Validation { message, issues } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message.to_string(),
                Some(issues),
            ),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m, None),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m, None),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m, None),
            ApiError::Internal(cause) => {
                error!(err = %cause, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                    None,
                )
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        ApiError::from_link_error(e, "Invalid link data")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, issues) = self.parts();
        let body = ErrorBody {
            error: ErrorInfo {
                code,
                message,
                issues,
            },
        };
        (status, Json(body)).into_response()
    }
}
