//! Caller identity extractor
//!
//! Authentication happens upstream; the auth layer forwards the student's id
//! in the `x-user-id` header. Requests without it are rejected with 401.

use crate::error::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest accepted user id
const MAX_USER_ID_LENGTH: usize = 128;

/// Authenticated user id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthenticated)?;

        if value.len() > MAX_USER_ID_LENGTH {
            return Err(AppError::Validation(format!(
                "{} exceeds {} bytes",
                USER_ID_HEADER, MAX_USER_ID_LENGTH
            )));
        }

        Ok(UserId(value.to_string()))
    }
}
