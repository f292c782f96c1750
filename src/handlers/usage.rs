//! Usage reporting endpoints
//!
//! GET /api/usage reports the caller's current period against the quota plus
//! recent history. GET /api/usage/summary aggregates one period across users
//! and is restricted to operator accounts.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::ledger::{PeriodKey, PeriodSummary, UsagePeriod, UsageSnapshot};
use crate::middleware::UserId;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

/// Number of periods returned as history
pub const HISTORY_PERIODS: usize = 3;

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub success: bool,
    pub current: UsageSnapshot,
    pub history: Vec<UsagePeriod>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub summary: PeriodSummary,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
}

/// GET /api/usage handler
pub async fn handler(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<UsageResponse>, AppError> {
    let ledger = state.ledger();
    let current = ledger.snapshot(user.as_str()).await?;
    let history = ledger.history(user.as_str(), HISTORY_PERIODS).await?;

    Ok(Json(UsageResponse {
        success: true,
        current,
        history,
    }))
}

/// GET /api/usage/summary handler
///
/// Operator only: callers not listed in `server.admin_users` get a 403.
/// `period` defaults to the current period; anything other than `YYYY-MM` is a 400.
pub async fn summary_handler(
    State(state): State<AppState>,
    user: UserId,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    if !state.config().server.is_admin(user.as_str()) {
        tracing::warn!(user_id = %user.as_str(), "Usage summary refused for non-admin caller");
        return Err(AppError::Forbidden(user.as_str().to_string()));
    }

    let period = match query.period.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<PeriodKey>().map_err(AppError::Validation)?,
        _ => state.ledger().current_period(),
    };

    let summary = state.ledger().period_summary(period).await?;
    Ok(Json(SummaryResponse {
        success: true,
        summary,
    }))
}
