use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::request::RequestStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request {request_id} is no longer pending (status: {status})")]
    NoLongerPending {
        request_id: Uuid,
        status: RequestStatus,
    },

    #[error("unauthenticated: {0}")]
    Unauthorized(String),

    #[error("not permitted: {0}")]
    Forbidden(String),

    #[error("cannot move request from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("request {request_id} was already taken by another mechanic")]
    AlreadyClaimed { request_id: Uuid },

    #[error("mechanic {mechanic_id} already has an active request")]
    MechanicUnavailable { mechanic_id: Uuid },

    #[error("dependency failed: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::NoLongerPending { .. } => "not_pending",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "not_yours",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::AlreadyClaimed { .. } => "already_claimed",
            AppError::MechanicUnavailable { .. } => "mechanic_unavailable",
            AppError::Dependency(_) => "dependency_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::NoLongerPending { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AlreadyClaimed { .. } | AppError::MechanicUnavailable { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Dependency(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::AlreadyClaimed { .. } => "this job was already taken".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use uuid::Uuid;

    use super::AppError;
    use crate::models::request::RequestStatus;

    #[test]
    fn rejection_kinds_keep_distinct_codes() {
        let claimed = AppError::AlreadyClaimed {
            request_id: Uuid::nil(),
        };
        let illegal = AppError::InvalidTransition {
            from: RequestStatus::Completed,
            to: RequestStatus::Enroute,
        };

        assert_eq!(claimed.status_code(), StatusCode::CONFLICT);
        assert_eq!(claimed.code(), "already_claimed");
        assert_eq!(illegal.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            illegal.to_string(),
            "cannot move request from completed to enroute"
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
