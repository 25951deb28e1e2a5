//! API error envelope.
//!
//! Every error body is `{"code": <status>, "message": "<text>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for handler operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced at the API boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request admission failure (missing requester or origin pin).
    #[error("invalid client requester")]
    Forbidden,

    /// Driver did not validate the VMware installation.
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    /// Request could not be served (parse failure, unknown device,
    /// vendor error text).
    #[error("{0}")]
    BadRequest(String),

    /// No route matched.
    #[error("not found")]
    NotFound,

    /// Reserved route without an implementation.
    #[error("not implemented")]
    NotImplemented,

    /// Server-side failure.
    #[error("{0}")]
    Server(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ValidationFailure(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
pub struct StandardResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::debug!(code = status.as_u16(), message = %self, "request error");
        let body = StandardResponse {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<vmgate_driver::DriverError> for ApiError {
    fn from(err: vmgate_driver::DriverError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::ValidationFailure("nope".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NotImplemented.status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
