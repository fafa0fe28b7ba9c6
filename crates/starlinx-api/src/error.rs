//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping storage and validation errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use starlinx_core::error::StarlinxError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "unauthorized", "unprocessable_entity").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 401 Unauthorized - admin key missing or wrong.
    Unauthorized(String),
    /// 422 Unprocessable Entity - a form field failed validation.
    UnprocessableEntity(String),
    /// 429 Too Many Requests - submission rate limit hit.
    TooManyRequests,
    /// 500 Internal Server Error - the submission could not be stored.
    Internal(String),
    /// 503 Service Unavailable - database sink not usable.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<StarlinxError> for ApiError {
    fn from(err: StarlinxError) -> Self {
        match err {
            StarlinxError::Validation { .. } => ApiError::UnprocessableEntity(err.to_string()),
            StarlinxError::Config(_) | StarlinxError::Storage(_) | StarlinxError::Timeout { .. } => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_422() {
        let err: ApiError = StarlinxError::invalid("name", "must not be empty").into();
        assert!(matches!(err, ApiError::UnprocessableEntity(_)));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_primary_sink_maps_to_500() {
        let err: ApiError = StarlinxError::PrimarySink("disk full".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_database_errors_map_to_503() {
        for err in [
            StarlinxError::Config("unsupported driver".into()),
            StarlinxError::Timeout { secs: 5 },
        ] {
            let api: ApiError = err.into();
            assert_eq!(api.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
