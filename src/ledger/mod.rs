//! Usage ledger
//!
//! Tracks per-user, per-period question counts against a global [`Quota`],
//! decides admission and records usage once an answer has been produced.
//!
//! Admission and commit are serialised per (user, period): [`UsageLedger::admit`]
//! holds the key's lock inside the returned [`Admission`] until it is either
//! committed or dropped. Dropping an uncommitted admission releases the lock
//! without touching the counters, so failed, timed-out and cancelled requests
//! are never charged.

pub mod memory;

pub use memory::MemoryUsageStore;

use crate::error::{AppError, AppResult};
use crate::router::QuestionType;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Prune idle per-key locks once the map grows past this many entries
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Monthly question limits shared by every user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Quota {
    #[serde(default = "default_simple_limit")]
    pub simple_limit: u32,
    #[serde(default = "default_complex_limit")]
    pub complex_limit: u32,
    #[serde(default = "default_total_limit")]
    pub total_limit: u32,
}

fn default_simple_limit() -> u32 {
    300
}

fn default_complex_limit() -> u32 {
    300
}

fn default_total_limit() -> u32 {
    600
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            simple_limit: default_simple_limit(),
            complex_limit: default_complex_limit(),
            total_limit: default_total_limit(),
        }
    }
}

impl Quota {
    /// Create a quota
    pub fn new(simple_limit: u32, complex_limit: u32, total_limit: u32) -> Self {
        Self {
            simple_limit,
            complex_limit,
            total_limit,
        }
    }

    /// Own limit for a question type
    pub fn limit_for(&self, question_type: QuestionType) -> u32 {
        match question_type {
            QuestionType::Simple => self.simple_limit,
            QuestionType::Complex => self.complex_limit,
        }
    }

    /// Validate the limits
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if any limit is zero or the total limit can
    /// never bind because it exceeds the sum of the per-type limits.
    pub fn validate(&self) -> AppResult<()> {
        for (name, limit) in [
            ("simple_limit", self.simple_limit),
            ("complex_limit", self.complex_limit),
            ("total_limit", self.total_limit),
        ] {
            if limit == 0 {
                return Err(AppError::Config(format!(
                    "quota.{} must be greater than 0",
                    name
                )));
            }
        }

        let combined = u64::from(self.simple_limit) + u64::from(self.complex_limit);
        if u64::from(self.total_limit) > combined {
            return Err(AppError::Config(format!(
                "quota.total_limit ({}) cannot exceed simple_limit + complex_limit ({})",
                self.total_limit, combined
            )));
        }

        Ok(())
    }

    /// Decide admission for one request given the current counts
    ///
    /// 1. Total at or over the total limit: deny.
    /// 2. Own counter at or over its limit: borrow from the other type if it
    ///    has headroom, otherwise deny.
    /// 3. Otherwise allow against the own counter.
    pub fn evaluate(&self, counts: UsageCounts, question_type: QuestionType) -> UsageDecision {
        if counts.total() >= self.total_limit {
            return UsageDecision::Denied(QuotaDenial::new(
                DenialReason::TotalLimitExceeded,
                counts,
                self.total_limit,
            ));
        }

        let own_limit = self.limit_for(question_type);
        if counts.get(question_type) >= own_limit {
            let other = question_type.other();
            if counts.get(other) < self.limit_for(other) {
                return UsageDecision::Allowed {
                    deduct_from: Some(other),
                };
            }
            return UsageDecision::Denied(QuotaDenial::new(
                DenialReason::for_type(question_type),
                counts,
                own_limit,
            ));
        }

        UsageDecision::Allowed { deduct_from: None }
    }
}

/// Calendar month a usage row belongs to, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    /// Create a period key
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be in 1..=12, got {}", month));
        }
        Ok(Self { year, month })
    }

    /// Period containing the given instant (UTC)
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|_| format!("invalid period '{}' (expected YYYY-MM)", s))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of one usage row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub user_id: String,
    pub period: PeriodKey,
}

impl UsageKey {
    pub fn new(user_id: impl Into<String>, period: PeriodKey) -> Self {
        Self {
            user_id: user_id.into(),
            period,
        }
    }
}

/// Simple and complex question counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounts {
    pub simple: u32,
    pub complex: u32,
}

impl UsageCounts {
    pub fn total(&self) -> u32 {
        self.simple.saturating_add(self.complex)
    }

    pub fn get(&self, question_type: QuestionType) -> u32 {
        match question_type {
            QuestionType::Simple => self.simple,
            QuestionType::Complex => self.complex,
        }
    }

    fn increment(&mut self, counter: QuestionType) {
        match counter {
            QuestionType::Simple => self.simple = self.simple.saturating_add(1),
            QuestionType::Complex => self.complex = self.complex.saturating_add(1),
        }
    }
}

/// One (user, period) usage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub user_id: String,
    pub period: PeriodKey,
    #[serde(flatten)]
    pub counts: UsageCounts,
    pub last_used: Option<DateTime<Utc>>,
}

impl UsagePeriod {
    /// Fresh zeroed row
    pub fn empty(key: &UsageKey) -> Self {
        Self {
            user_id: key.user_id.clone(),
            period: key.period,
            counts: UsageCounts::default(),
            last_used: None,
        }
    }

    /// Record one question against `counter`
    pub fn record(&mut self, counter: QuestionType, at: DateTime<Utc>) {
        self.counts.increment(counter);
        self.last_used = Some(at);
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    TotalLimitExceeded,
    SimpleLimitExceeded,
    ComplexLimitExceeded,
}

impl DenialReason {
    /// Per-type reason for an exhausted own counter
    pub fn for_type(question_type: QuestionType) -> Self {
        match question_type {
            QuestionType::Simple => Self::SimpleLimitExceeded,
            QuestionType::Complex => Self::ComplexLimitExceeded,
        }
    }

    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalLimitExceeded => "total_limit_exceeded",
            Self::SimpleLimitExceeded => "simple_limit_exceeded",
            Self::ComplexLimitExceeded => "complex_limit_exceeded",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts as reported back to a denied caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub simple: u32,
    pub complex: u32,
    pub total: u32,
}

impl From<UsageCounts> for UsageTotals {
    fn from(counts: UsageCounts) -> Self {
        Self {
            simple: counts.simple,
            complex: counts.complex,
            total: counts.total(),
        }
    }
}

/// Structured quota denial, serialised as the 429 response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaDenial {
    pub allowed: bool,
    pub reason: DenialReason,
    pub message: String,
    pub usage: UsageTotals,
}

impl QuotaDenial {
    /// Build a denial; `limit` is the limit named by `reason`
    pub fn new(reason: DenialReason, counts: UsageCounts, limit: u32) -> Self {
        let message = match reason {
            DenialReason::TotalLimitExceeded => {
                format!("월간 총 사용 한도({}회)를 초과했습니다.", limit)
            }
            DenialReason::SimpleLimitExceeded => {
                format!("간단한 질문 한도({}회)를 초과했습니다.", limit)
            }
            DenialReason::ComplexLimitExceeded => {
                format!("복잡한 질문 한도({}회)를 초과했습니다.", limit)
            }
        };

        Self {
            allowed: false,
            reason,
            message,
            usage: counts.into(),
        }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq)]
pub enum UsageDecision {
    /// Admitted; `deduct_from` names the sibling counter to charge instead
    Allowed { deduct_from: Option<QuestionType> },
    Denied(QuotaDenial),
}

impl UsageDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn deduct_from(&self) -> Option<QuestionType> {
        match self {
            Self::Allowed { deduct_from } => *deduct_from,
            Self::Denied(_) => None,
        }
    }
}

/// Per-type usage for the user-facing usage endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl CounterUsage {
    fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Current-period usage against the quota
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub period: PeriodKey,
    pub simple: CounterUsage,
    pub complex: CounterUsage,
    pub total: CounterUsage,
    pub last_used: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    pub fn new(row: &UsagePeriod, quota: &Quota) -> Self {
        Self {
            period: row.period,
            simple: CounterUsage::new(row.counts.simple, quota.simple_limit),
            complex: CounterUsage::new(row.counts.complex, quota.complex_limit),
            total: CounterUsage::new(row.counts.total(), quota.total_limit),
            last_used: row.last_used,
        }
    }
}

/// Aggregate usage across all users for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub period: PeriodKey,
    pub total_users: u64,
    pub total_simple: u64,
    pub total_complex: u64,
    pub total_questions: u64,
    pub avg_per_user: f64,
}

/// Source of the current time, injected so period rollover is testable
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Usage store failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("usage store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::LedgerUnavailable(err.to_string())
    }
}

/// Durable keyed storage for usage rows
///
/// Implementations must keep (user, period) unique and apply `increment`
/// atomically. Both `get_or_create` and `increment` create a missing row.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_or_create(&self, key: &UsageKey) -> Result<UsagePeriod, StoreError>;

    async fn increment(
        &self,
        key: &UsageKey,
        counter: QuestionType,
        at: DateTime<Utc>,
    ) -> Result<UsagePeriod, StoreError>;

    /// Most recent periods first
    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<UsagePeriod>, StoreError>;

    async fn period_summary(&self, period: PeriodKey) -> Result<PeriodSummary, StoreError>;
}

/// Quota enforcement over a [`UsageStore`]
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    quota: Quota,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<UsageKey, Arc<AsyncMutex<()>>>>,
}

impl UsageLedger {
    /// Create a ledger using the system clock
    pub fn new(store: Arc<dyn UsageStore>, quota: Quota) -> Self {
        Self::with_clock(store, quota, Arc::new(SystemClock))
    }

    /// Create a ledger with an injected clock
    pub fn with_clock(store: Arc<dyn UsageStore>, quota: Quota, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            quota,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Period the clock currently falls in
    pub fn current_period(&self) -> PeriodKey {
        PeriodKey::containing(self.clock.now())
    }

    fn current_key(&self, user_id: &str) -> UsageKey {
        UsageKey::new(user_id, self.current_period())
    }

    async fn lock_key(&self, key: &UsageKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Evaluate admission without reserving anything
    ///
    /// Informational only; use [`UsageLedger::admit`] on the request path so
    /// that check and commit cannot race.
    pub async fn check_admission(
        &self,
        user_id: &str,
        question_type: QuestionType,
    ) -> AppResult<UsageDecision> {
        let row = self.store.get_or_create(&self.current_key(user_id)).await?;
        Ok(self.quota.evaluate(row.counts, question_type))
    }

    /// Check admission and hold the (user, period) lock until commit or drop
    ///
    /// # Errors
    ///
    /// - `AppError::QuotaExceeded` when the quota denies the request
    /// - `AppError::LedgerUnavailable` when the store fails (fail closed)
    pub async fn admit(&self, user_id: &str, question_type: QuestionType) -> AppResult<Admission> {
        let key = self.current_key(user_id);
        let guard = self.lock_key(&key).await;

        let row = self.store.get_or_create(&key).await?;
        match self.quota.evaluate(row.counts, question_type) {
            UsageDecision::Denied(denial) => {
                tracing::info!(
                    user_id = %key.user_id,
                    period = %key.period,
                    question_type = %question_type,
                    reason = %denial.reason,
                    simple = row.counts.simple,
                    complex = row.counts.complex,
                    "Quota denied request"
                );
                Err(AppError::QuotaExceeded(denial))
            }
            UsageDecision::Allowed { deduct_from } => {
                if let Some(other) = deduct_from {
                    tracing::info!(
                        user_id = %key.user_id,
                        period = %key.period,
                        question_type = %question_type,
                        charged_to = %other,
                        "Own quota exhausted, deducting from sibling counter"
                    );
                }
                Ok(Admission {
                    store: Arc::clone(&self.store),
                    clock: Arc::clone(&self.clock),
                    key,
                    question_type,
                    deduct_from,
                    _guard: guard,
                })
            }
        }
    }

    /// Record one question outside an [`Admission`]
    ///
    /// Increments `deduct_from` if present, otherwise `question_type`.
    pub async fn commit(
        &self,
        user_id: &str,
        question_type: QuestionType,
        deduct_from: Option<QuestionType>,
    ) -> AppResult<UsagePeriod> {
        let key = self.current_key(user_id);
        let _guard = self.lock_key(&key).await;
        let counter = deduct_from.unwrap_or(question_type);
        Ok(self.store.increment(&key, counter, self.clock.now()).await?)
    }

    /// Current-period usage for a user
    pub async fn snapshot(&self, user_id: &str) -> AppResult<UsageSnapshot> {
        let row = self.store.get_or_create(&self.current_key(user_id)).await?;
        Ok(UsageSnapshot::new(&row, &self.quota))
    }

    /// Most recent usage rows for a user
    pub async fn history(&self, user_id: &str, limit: usize) -> AppResult<Vec<UsagePeriod>> {
        Ok(self.store.history(user_id, limit).await?)
    }

    /// Usage across all users for a period
    pub async fn period_summary(&self, period: PeriodKey) -> AppResult<PeriodSummary> {
        Ok(self.store.period_summary(period).await?)
    }
}

/// An admitted request holding its (user, period) lock
///
/// Call [`Admission::commit`] after the answer was produced. Dropping the
/// admission instead records nothing.
pub struct Admission {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    key: UsageKey,
    question_type: QuestionType,
    deduct_from: Option<QuestionType>,
    _guard: OwnedMutexGuard<()>,
}

impl Admission {
    pub fn question_type(&self) -> QuestionType {
        self.question_type
    }

    pub fn deduct_from(&self) -> Option<QuestionType> {
        self.deduct_from
    }

    /// Counter the commit will increment
    pub fn charged_to(&self) -> QuestionType {
        self.deduct_from.unwrap_or(self.question_type)
    }

    pub fn period(&self) -> PeriodKey {
        self.key.period
    }

    /// Increment the charged counter and release the lock
    pub async fn commit(self) -> AppResult<UsagePeriod> {
        let row = self
            .store
            .increment(&self.key, self.charged_to(), self.clock.now())
            .await?;

        tracing::debug!(
            user_id = %self.key.user_id,
            period = %self.key.period,
            counter = %self.charged_to(),
            simple = row.counts.simple,
            complex = row.counts.complex,
            "Usage committed"
        );

        Ok(row)
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("key", &self.key)
            .field("question_type", &self.question_type)
            .field("deduct_from", &self.deduct_from)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock pinned to a settable instant
    struct FixedClock(AtomicI64);

    impl FixedClock {
        fn at(year: i32, month: u32, day: u32) -> Arc<Self> {
            let ts = Utc
                .with_ymd_and_hms(year, month, day, 12, 0, 0)
                .unwrap()
                .timestamp();
            Arc::new(Self(AtomicI64::new(ts)))
        }

        fn set(&self, year: i32, month: u32, day: u32) {
            let ts = Utc
                .with_ymd_and_hms(year, month, day, 0, 0, 0)
                .unwrap()
                .timestamp();
            self.0.store(ts, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(self.0.load(Ordering::SeqCst), 0).unwrap()
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl UsageStore for UnavailableStore {
        async fn get_or_create(&self, _key: &UsageKey) -> Result<UsagePeriod, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn increment(
            &self,
            _key: &UsageKey,
            _counter: QuestionType,
            _at: DateTime<Utc>,
        ) -> Result<UsagePeriod, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn history(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<UsagePeriod>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn period_summary(&self, _period: PeriodKey) -> Result<PeriodSummary, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn counts(simple: u32, complex: u32) -> UsageCounts {
        UsageCounts { simple, complex }
    }

    #[test]
    fn test_evaluate_allows_under_limits() {
        let quota = Quota::default();
        let decision = quota.evaluate(counts(10, 10), QuestionType::Simple);
        assert_eq!(decision, UsageDecision::Allowed { deduct_from: None });
    }

    #[test]
    fn test_evaluate_total_limit_checked_first() {
        let quota = Quota::new(2, 2, 3);
        let UsageDecision::Denied(denial) = quota.evaluate(counts(1, 2), QuestionType::Simple)
        else {
            panic!("expected denial");
        };
        assert_eq!(denial.reason, DenialReason::TotalLimitExceeded);
        assert_eq!(denial.usage.total, 3);
        assert!(!denial.allowed);
    }

    #[test]
    fn test_evaluate_borrows_from_sibling() {
        let quota = Quota::new(2, 2, 3);
        assert_eq!(
            quota.evaluate(counts(2, 0), QuestionType::Simple),
            UsageDecision::Allowed {
                deduct_from: Some(QuestionType::Complex)
            }
        );
        assert_eq!(
            quota.evaluate(counts(0, 2), QuestionType::Complex),
            UsageDecision::Allowed {
                deduct_from: Some(QuestionType::Simple)
            }
        );
    }

    #[test]
    fn test_evaluate_denies_when_both_counters_exhausted() {
        let quota = Quota::new(2, 2, 10);
        let UsageDecision::Denied(denial) = quota.evaluate(counts(2, 2), QuestionType::Complex)
        else {
            panic!("expected denial");
        };
        assert_eq!(denial.reason, DenialReason::ComplexLimitExceeded);
        assert_eq!(denial.message, "복잡한 질문 한도(2회)를 초과했습니다.");
    }

    #[test]
    fn test_quota_validation() {
        assert!(Quota::default().validate().is_ok());
        assert!(Quota::new(0, 1, 1).validate().is_err());
        let err = Quota::new(2, 2, 5).validate().unwrap_err().to_string();
        assert!(err.contains("total_limit"));
    }

    #[test]
    fn test_period_key_format_and_parse() {
        let key = PeriodKey::new(2025, 3).unwrap();
        assert_eq!(key.to_string(), "2025-03");
        assert_eq!("2025-03".parse::<PeriodKey>().unwrap(), key);
        assert!("2025-13".parse::<PeriodKey>().is_err());
        assert!("March".parse::<PeriodKey>().is_err());
        assert!(PeriodKey::new(2025, 0).is_err());
        assert!(PeriodKey::new(2024, 12).unwrap() < key);
    }

    #[test]
    fn test_snapshot_remaining_saturates() {
        let key = UsageKey::new("u1", PeriodKey::new(2025, 1).unwrap());
        let mut row = UsagePeriod::empty(&key);
        row.counts = counts(3, 0);

        let snapshot = UsageSnapshot::new(&row, &Quota::new(2, 2, 3));
        assert_eq!(snapshot.simple.remaining, 0);
        assert_eq!(snapshot.complex.remaining, 2);
        assert_eq!(snapshot.total.used, 3);
        assert_eq!(snapshot.total.remaining, 0);
    }

    #[tokio::test]
    async fn test_cross_tier_deduction_scenario() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), Quota::new(2, 2, 3));

        for _ in 0..2 {
            let admission = ledger.admit("u1", QuestionType::Simple).await.unwrap();
            assert_eq!(admission.deduct_from(), None);
            admission.commit().await.unwrap();
        }

        let third = ledger.admit("u1", QuestionType::Simple).await.unwrap();
        assert_eq!(third.deduct_from(), Some(QuestionType::Complex));
        let row = third.commit().await.unwrap();
        assert_eq!(row.counts, counts(2, 1));

        for question_type in [QuestionType::Simple, QuestionType::Complex] {
            match ledger.admit("u1", question_type).await {
                Err(AppError::QuotaExceeded(denial)) => {
                    assert_eq!(denial.reason, DenialReason::TotalLimitExceeded);
                }
                other => panic!("expected total limit denial, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_admission_charges_nothing() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), Quota::default());

        let admission = ledger.admit("u1", QuestionType::Complex).await.unwrap();
        drop(admission);

        let snapshot = ledger.snapshot("u1").await.unwrap();
        assert_eq!(snapshot.total.used, 0);

        // Lock was released by the drop
        let again = ledger.admit("u1", QuestionType::Complex).await.unwrap();
        again.commit().await.unwrap();
        assert_eq!(ledger.snapshot("u1").await.unwrap().complex.used, 1);
    }

    #[tokio::test]
    async fn test_commit_targets_deduction_counter() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), Quota::default());

        let row = ledger
            .commit("u1", QuestionType::Simple, Some(QuestionType::Complex))
            .await
            .unwrap();
        assert_eq!(row.counts, counts(0, 1));
        assert!(row.last_used.is_some());
    }

    #[tokio::test]
    async fn test_new_period_starts_from_zero() {
        let clock = FixedClock::at(2025, 1, 31);
        let ledger = UsageLedger::with_clock(
            Arc::new(MemoryUsageStore::new()),
            Quota::new(1, 1, 2),
            clock.clone(),
        );

        ledger
            .admit("u1", QuestionType::Simple)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        ledger
            .admit("u1", QuestionType::Complex)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert!(ledger.admit("u1", QuestionType::Simple).await.is_err());

        clock.set(2025, 2, 1);
        assert_eq!(ledger.current_period().to_string(), "2025-02");

        let admission = ledger.admit("u1", QuestionType::Simple).await.unwrap();
        assert_eq!(admission.deduct_from(), None);
        admission.commit().await.unwrap();

        let history = ledger.history("u1", 3).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period.to_string(), "2025-02");
        assert_eq!(history[0].counts, counts(1, 0));
        assert_eq!(history[1].counts, counts(1, 1));
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let ledger = UsageLedger::new(Arc::new(UnavailableStore), Quota::default());

        let result = ledger.admit("u1", QuestionType::Simple).await;
        assert!(matches!(result, Err(AppError::LedgerUnavailable(_))));

        let check = ledger.check_admission("u1", QuestionType::Simple).await;
        assert!(matches!(check, Err(AppError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_check_admission_reports_deduction() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), Quota::new(1, 5, 6));
        ledger
            .commit("u1", QuestionType::Simple, None)
            .await
            .unwrap();

        let decision = ledger
            .check_admission("u1", QuestionType::Simple)
            .await
            .unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.deduct_from(), Some(QuestionType::Complex));
    }
}
