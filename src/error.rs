//! Error types for tutorgate
//!
//! All errors implement `IntoResponse` for Axum handlers.

use crate::ledger::QuotaDenial;
use crate::router::ModelTier;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// User-facing message for completion failures; provider details stay in the logs
const MODEL_FAILURE_MESSAGE: &str = "AI 응답 생성 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config file '{path}' failed validation: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing or empty x-user-id header")]
    Unauthenticated,

    #[error("User '{0}' may not access this resource")]
    Forbidden(String),

    #[error("Quota exceeded: {}", .0.reason)]
    QuotaExceeded(QuotaDenial),

    #[error("Model invocation failed on {tier} tier: {reason}")]
    ModelInvocation {
        tier: ModelTier,
        reason: String,
        retryable: bool,
    },

    #[error("Request to {tier} tier timed out after {timeout_seconds} seconds")]
    ModelTimeout {
        tier: ModelTier,
        timeout_seconds: u64,
    },

    #[error("Usage ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the Router may retry the failed attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelInvocation { retryable, .. } => *retryable,
            Self::ModelTimeout { .. } => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let display = self.to_string();
        let (status, message) = match self {
            Self::QuotaExceeded(denial) => {
                return (StatusCode::TOO_MANY_REQUESTS, Json(denial)).into_response();
            }
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, display),
            Self::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "접근 권한이 없습니다.".to_string(),
            ),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, display),
            Self::ModelInvocation { .. } => {
                (StatusCode::BAD_GATEWAY, MODEL_FAILURE_MESSAGE.to_string())
            }
            Self::ModelTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, MODEL_FAILURE_MESSAGE.to_string())
            }
            Self::LedgerUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "사용량 확인에 실패했습니다. 잠시 후 다시 시도해주세요.".to_string(),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
