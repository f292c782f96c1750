//! tutorgate - Tiered question routing and usage metering for an exam-prep tutor
//!
//! Student questions are classified as simple or complex, answered on a fast
//! or thorough model tier, metered against monthly per-user quotas with
//! cross-tier deduction, and priced from the completion's token telemetry.

pub mod cli;
pub mod config;
pub mod context_cache;
pub mod cost;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod prompt;
pub mod router;
pub mod telemetry;
