//! JSON extractor with API-shaped error responses
//!
//! Wraps Axum's `Json` extractor so that malformed or invalid bodies are
//! answered with the same `{success: false, error}` envelope as every other
//! failure. Request types validate inside `Deserialize`, so validation
//! failures arrive here as data errors and map to 400.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

/// JSON extraction error
///
/// - JSON syntax and data errors → 400 Bad Request
/// - Missing content type → 415 Unsupported Media Type
#[derive(Debug)]
pub struct ApiJsonRejection(JsonRejection);

impl ApiJsonRejection {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            JsonRejection::MissingJsonContentType(_) => {
                "Content-Type must be application/json".to_string()
            }
            other => other.body_text(),
        }
    }
}

impl IntoResponse for ApiJsonRejection {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message(),
        }));
        (self.status(), body).into_response()
    }
}

/// Drop-in replacement for `axum::Json` in request position
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiJsonRejection(rejection)),
        }
    }
}
