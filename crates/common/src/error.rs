use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error types shared by every notification component.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Bad caller input (batch size, delay, missing fields, past-dated schedule).
    #[error("Validation error: {0}")]
    Validation(String),

    /// No addressable recipient, or no matching row.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Template missing or rendered content incomplete.
    #[error("Content resolution error: {0}")]
    ContentResolution(String),

    /// Transport call failed. Raised after the ledger recorded the failure.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Backing store unreachable or rejected the statement.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CourierResult<T> = Result<T, CourierError>;

impl From<sqlx::Error> for CourierError {
    fn from(err: sqlx::Error) -> Self {
        CourierError::Persistence(err.to_string())
    }
}

impl From<redis::RedisError> for CourierError {
    fn from(err: redis::RedisError) -> Self {
        CourierError::Persistence(format!("redis: {}", err))
    }
}

impl From<reqwest::Error> for CourierError {
    fn from(err: reqwest::Error) -> Self {
        CourierError::Delivery(err.to_string())
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl IntoResponse for CourierError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CourierError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CourierError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CourierError::ContentResolution(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            CourierError::Delivery(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            CourierError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            CourierError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            CourierError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            CourierError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            CourierError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
