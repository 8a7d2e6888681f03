//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::{ArcadeError, ErrorCategory};
use crate::oauth::OAuthError;
use crate::rewards::RewardsError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// NOT_FOUND, BAD_REQUEST, PRECONDITION_FAILED, CONFLICT, ...
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    PreconditionFailed(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map an arcade failure by its category. Duplicate claims get their own
    /// status so clients can treat them as already done.
    pub fn from_arcade(request_id: String, err: ArcadeError) -> Self {
        let message = err.to_string();
        let kind = match (&err, err.category()) {
            (ArcadeError::Rewards(RewardsError::AlreadyClaimed(_)), _) => ApiErrorKind::Conflict(message),
            (ArcadeError::OAuth(OAuthError::UnknownProvider(_)), _) => ApiErrorKind::BadRequest(message),
            (_, ErrorCategory::Precondition) => ApiErrorKind::PreconditionFailed(message),
            (_, ErrorCategory::External) => ApiErrorKind::ServiceUnavailable(message),
            (_, ErrorCategory::Defect) => {
                error!(request_id = %request_id, error = %err, "request hit a defect");
                ApiErrorKind::InternalError(message)
            }
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, code, message) = self.parts();
        write!(f, "[{}] {}: {}", self.request_id, code, message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::PreconditionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "PRECONDITION_FAILED", msg),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiErrorKind::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiErrorKind::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PreconditionError;
    use crate::store::StoreError;

    fn status_of(err: ArcadeError) -> StatusCode {
        ApiError::from_arcade("req-1".to_string(), err).into_response().status()
    }

    #[test]
    fn test_category_status_mapping() {
        assert_eq!(status_of(PreconditionError::NoWallet.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_of(StoreError::WriteFailed("down".to_string()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(RewardsError::AlreadyClaimed("kitten".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OAuthError::UnknownProvider("myspace".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_display_carries_request_id() {
        let err = ApiError::not_found("abc".to_string(), "no profile".to_string());
        assert_eq!(err.to_string(), "[abc] NOT_FOUND: no profile");
    }
}
