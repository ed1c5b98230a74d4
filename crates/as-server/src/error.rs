//! Maps the shared [`as_domain::Error`] onto the HTTP error envelope
//! (`{error:<kind>, message:<human>}`) and status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use as_domain::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Thin wrapper so handlers can `?`-propagate `as_domain::Error` directly
/// and have it turn into the right status code and envelope.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            "invalid_input" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "not_found" => StatusCode::NOT_FOUND,
            "timeout" => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind, error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: kind.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    ApiError(Error::NotFound(message.into()))
}

pub fn invalid_input(message: impl Into<String>) -> ApiError {
    ApiError(Error::InvalidInput(message.into()))
}
