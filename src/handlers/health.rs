//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;
use crate::router::ModelTier;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    pub version: &'static str,
    /// Configured model per tier
    pub models: TierModels,
}

#[derive(Debug, Serialize)]
pub struct TierModels {
    pub fast: String,
    pub thorough: String,
}

/// Health check handler
///
/// Always 200 while the process is serving; the completion service is not probed.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let config = state.config();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            version: env!("CARGO_PKG_VERSION"),
            models: TierModels {
                fast: config.tier(ModelTier::Fast).model().to_string(),
                thorough: config.tier(ModelTier::Thorough).model().to_string(),
            },
        }),
    )
}
