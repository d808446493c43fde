//! API error handling
//!
//! Every error leaves the API as `{code, message, retry_after?}` with the
//! stable snake_case codes of the auth core.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bloom_auth::AuthError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure reported by the auth core
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(err) => err.error_code(),
            Self::MissingToken => "invalid_token",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::BadRequest(_) => "invalid_request",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidParameter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to clients
    pub fn message(&self) -> String {
        match self {
            Self::Auth(err) => err.client_message(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Auth(AuthError::RateLimited { retry_after }) => Some(*retry_after),
            _ => None,
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code, e.g. `invalid_token`
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Seconds to wait before retrying (rate limiting only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.message(),
            retry_after: err.retry_after(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }

        let mut response = (status, Json(ErrorResponse::from(&self))).into_response();

        if let Some(retry_after) = self.retry_after() {
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u64));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<bloom_db::DbError> for ApiError {
    fn from(err: bloom_db::DbError) -> Self {
        Self::Auth(err.into())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    format!("{}: {}", field, e.message.as_ref().map(|m| m.as_ref()).unwrap_or("invalid"))
                })
            })
            .collect();
        Self::InvalidParameter(messages.join(", "))
    }
}
