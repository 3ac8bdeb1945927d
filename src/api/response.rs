//! API response envelope and error codes
//!
//! All responses are `{code, msg, data}`: `code` 0 means success.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN_ACTION: i32 = 2003;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const CONFLICT: i32 = 4009;
    pub const RATE_LIMITED: i32 = 4291;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const GATEWAY_ERROR: i32 = 5002;
}

fn api_code(err: &CoreError) -> i32 {
    match err {
        CoreError::Validation(_) => error_codes::INVALID_PARAMETER,
        CoreError::Authorization { .. } => error_codes::FORBIDDEN_ACTION,
        CoreError::NotFound { .. } => error_codes::NOT_FOUND,
        CoreError::Conflict(_) => error_codes::CONFLICT,
        CoreError::Gateway(_) => error_codes::GATEWAY_ERROR,
        CoreError::Persistence(_) => error_codes::INTERNAL_ERROR,
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let msg = match &self {
            // Storage details stay in the log
            CoreError::Persistence(detail) => {
                tracing::error!(error = %detail, "Request failed on storage");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::<()>::error(api_code(&self), msg))).into_response()
    }
}

/// Shorthand for a 4xx/5xx envelope outside the engine's error type.
pub fn reject(status: StatusCode, code: i32, msg: &str) -> Response {
    (status, Json(ApiResponse::<()>::error(code, msg))).into_response()
}
