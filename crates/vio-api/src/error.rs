//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`ServiceError`] and request-parsing failures to HTTP status codes
//! and a JSON body of the form `{"error": {"code", "message"}}`.
//! Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::service::ServiceError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Absent, or outside the caller's scope (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request content failed business validation (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Body, path or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Role, ownership or scope forbids the operation (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Illegal lifecycle transition (409).
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// Message is logged but not returned to the client (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_STATUS_TRANSITION"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::PermissionDenied(msg) => Self::Forbidden(msg),
            ServiceError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            ServiceError::InvalidInput(msg) => Self::Validation(msg),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
            ServiceError::InvalidStatusTransition(err) => Self::InvalidTransition(err.to_string()),
            ServiceError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<vio_core::CoreError> for AppError {
    fn from(err: vio_core::CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use vio_state::TransitionError;

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::InvalidTransition("x".into()),
                StatusCode::CONFLICT,
                "INVALID_STATUS_TRANSITION",
            ),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err}");
        }
    }

    #[test]
    fn service_errors_map_to_http_kinds() {
        let forbidden: AppError = ServiceError::PermissionDenied("no".into()).into();
        assert!(matches!(forbidden, AppError::Forbidden(_)));

        let missing: AppError = ServiceError::NotFound("appeal").into();
        assert_eq!(missing.to_string(), "not found: appeal not found");

        let invalid: AppError = ServiceError::InvalidInput("short".into()).into();
        assert!(matches!(invalid, AppError::Validation(_)));

        let transition: AppError = ServiceError::InvalidStatusTransition(
            TransitionError::TerminalState {
                entity: "appeal",
                state: "CLOSED".into(),
            },
        )
        .into();
        assert_eq!(
            transition.status_and_code().1,
            "INVALID_STATUS_TRANSITION"
        );
    }

    async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let (status, body) = response_parts(AppError::Internal("pool timed out".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert_eq!(body["error"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn validation_reason_is_the_message() {
        let (status, body) =
            response_parts(AppError::Validation("reason_text must be at least 10 characters".into())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("reason_text must be at least 10 characters"));
        assert_eq!(body["error"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn client_errors_carry_message() {
        let (status, body) = response_parts(AppError::Conflict("already appealed".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("already appealed"));
    }
}
