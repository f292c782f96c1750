//! Page context cache endpoint
//!
//! POST /api/cache-context stores the explanation shown on a page so later
//! chat requests can reference it by `page_id`.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::extractor::ApiJson;
use crate::middleware::{RequestId, UserId};
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MISSING_FIELDS_MESSAGE: &str = "page_id와 context가 필요합니다";

#[derive(Debug, Deserialize)]
pub struct CacheContextRequest {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheContextResponse {
    pub success: bool,
    pub page_id: String,
    /// Stored context length in characters
    pub cached_length: usize,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/cache-context handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: UserId,
    ApiJson(request): ApiJson<CacheContextRequest>,
) -> Result<Json<CacheContextResponse>, AppError> {
    let (Some(page_id), Some(context)) = (
        request.page_id.filter(|v| !v.trim().is_empty()),
        request.context.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(MISSING_FIELDS_MESSAGE.to_string()));
    };

    let entry = state.contexts().put(&page_id, &context).await?;
    let cached_length = context.chars().count();

    tracing::info!(
        request_id = %request_id,
        user_id = %user,
        page_id = %page_id,
        cached_length,
        "Context cached"
    );

    Ok(Json(CacheContextResponse {
        success: true,
        page_id: page_id.trim().to_string(),
        cached_length,
        expires_at: entry.expires_at,
    }))
}
