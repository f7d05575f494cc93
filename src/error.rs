use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub enum AppError {
    NotFound(String),
    BadRequest(String),
    QuotaExceeded(String),
    VoucherUsed(String),
    Unauthorized(String),
    Forbidden(String),
    AddressesExhausted,
    Resource(String),
    Database(sqlx::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::QuotaExceeded(msg) => write!(f, "quota exceeded: {msg}"),
            AppError::VoucherUsed(msg) => write!(f, "voucher used: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::AddressesExhausted => write!(f, "no IPv4 addresses available"),
            AppError::Resource(msg) => write!(f, "resource error: {msg}"),
            AppError::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => {
                tracing::warn!(error_type = "not_found", message = %msg, "Responding with 404");
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            AppError::BadRequest(msg) => {
                tracing::warn!(error_type = "bad_request", message = %msg, "Responding with 400");
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            AppError::QuotaExceeded(msg) => {
                tracing::warn!(error_type = "quota_exceeded", message = %msg, "Responding with 400");
                (StatusCode::BAD_REQUEST, "MAX_DEVICES_REACHED", msg)
            }
            AppError::VoucherUsed(msg) => {
                tracing::warn!(error_type = "voucher_used", message = %msg, "Responding with 400");
                (StatusCode::BAD_REQUEST, "VOUCHER_USED", msg)
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!(error_type = "unauthorized", message = %msg, "Responding with 401");
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
            }
            AppError::Forbidden(msg) => {
                tracing::warn!(error_type = "forbidden", message = %msg, "Responding with 403");
                (StatusCode::FORBIDDEN, "INVALID_ACCESS_TOKEN", msg)
            }
            AppError::AddressesExhausted => {
                tracing::error!(error_type = "addresses_exhausted", "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ADDRESSES_EXHAUSTED",
                    "No IP addresses available".to_string(),
                )
            }
            AppError::Resource(msg) => {
                tracing::error!(error_type = "resource", message = %msg, "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!(error_type = "database", error = %e, "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "code": code, "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}
