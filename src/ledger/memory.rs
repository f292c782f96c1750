//! In-process usage store
//!
//! Rows live in a `RwLock<HashMap>` keyed by (user, period). Creation and
//! increment both run under the write lock, so a key can never be inserted
//! twice and increments never interleave.

use super::{PeriodKey, PeriodSummary, StoreError, UsageKey, UsagePeriod, UsageStore};
use crate::router::QuestionType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Usage rows held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    rows: RwLock<HashMap<UsageKey, UsagePeriod>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (user, period) rows
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_or_create(&self, key: &UsageKey) -> Result<UsagePeriod, StoreError> {
        if let Some(row) = self.rows.read().await.get(key) {
            return Ok(row.clone());
        }

        let mut rows = self.rows.write().await;
        let row = rows
            .entry(key.clone())
            .or_insert_with(|| UsagePeriod::empty(key));
        Ok(row.clone())
    }

    async fn increment(
        &self,
        key: &UsageKey,
        counter: QuestionType,
        at: DateTime<Utc>,
    ) -> Result<UsagePeriod, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(key.clone())
            .or_insert_with(|| UsagePeriod::empty(key));
        row.record(counter, at);
        Ok(row.clone())
    }

    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<UsagePeriod>, StoreError> {
        let rows = self.rows.read().await;
        let mut history: Vec<UsagePeriod> = rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.period.cmp(&a.period));
        history.truncate(limit);
        Ok(history)
    }

    async fn period_summary(&self, period: PeriodKey) -> Result<PeriodSummary, StoreError> {
        let rows = self.rows.read().await;

        let mut total_users = 0u64;
        let mut total_simple = 0u64;
        let mut total_complex = 0u64;
        for row in rows.values().filter(|row| row.period == period) {
            total_users += 1;
            total_simple += u64::from(row.counts.simple);
            total_complex += u64::from(row.counts.complex);
        }

        let total_questions = total_simple + total_complex;
        let avg_per_user = if total_users == 0 {
            0.0
        } else {
            total_questions as f64 / total_users as f64
        };

        Ok(PeriodSummary {
            period,
            total_users,
            total_simple,
            total_complex,
            total_questions,
            avg_per_user,
        })
    }
}
