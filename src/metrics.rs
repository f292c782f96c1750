//! Prometheus metrics collection for tutorgate
//!
//! Tracks answered questions by tier and type, quota denials, cross-tier
//! deductions, model failures, token consumption, estimated spend and model
//! latency. Exposed via the `/metrics` endpoint in Prometheus text format.
//!
//! Every label value comes from a closed enum, so cardinality is fixed.

use crate::cost::CostBreakdown;
use crate::ledger::DenialReason;
use crate::models::UsageTelemetry;
use crate::router::{ModelTier, QuestionType};
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Token category label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Input,
    Output,
    CacheWrite,
    CacheRead,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Input => "input",
            TokenKind::Output => "output",
            TokenKind::CacheWrite => "cache_write",
            TokenKind::CacheRead => "cache_read",
        }
    }
}

/// Metrics collector for tutorgate
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    questions_total: IntCounterVec,
    quota_denials: IntCounterVec,
    cross_tier_deductions: IntCounterVec,
    model_failures: IntCounterVec,
    tokens_total: IntCounterVec,
    cost_usd_total: CounterVec,
    model_latency: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 tiers x 2 question types
        let questions_total = IntCounterVec::new(
            Opts::new(
                "tutorgate_questions_total",
                "Total answered questions by tier and question type",
            ),
            &["tier", "question_type"],
        )?;

        let quota_denials = IntCounterVec::new(
            Opts::new(
                "tutorgate_quota_denials_total",
                "Total requests denied by the usage quota, by denial reason",
            ),
            &["reason"],
        )?;

        let cross_tier_deductions = IntCounterVec::new(
            Opts::new(
                "tutorgate_cross_tier_deductions_total",
                "Total requests charged to the sibling counter, by the counter charged",
            ),
            &["charged_to"],
        )?;

        let model_failures = IntCounterVec::new(
            Opts::new(
                "tutorgate_model_failures_total",
                "Total failed completion attempts (errors and timeouts) by tier",
            ),
            &["tier"],
        )?;

        // Cardinality: 2 tiers x 4 token kinds
        let tokens_total = IntCounterVec::new(
            Opts::new(
                "tutorgate_tokens_total",
                "Total tokens reported by the completion service, by tier and kind",
            ),
            &["tier", "kind"],
        )?;

        let cost_usd_total = CounterVec::new(
            Opts::new(
                "tutorgate_cost_usd_total",
                "Estimated completion spend in USD by tier",
            ),
            &["tier"],
        )?;

        let model_latency = HistogramVec::new(
            HistogramOpts::new(
                "tutorgate_model_latency_ms",
                "Completion call latency in milliseconds by tier",
            )
            .buckets(vec![
                100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["tier"],
        )?;

        registry.register(Box::new(questions_total.clone()))?;
        registry.register(Box::new(quota_denials.clone()))?;
        registry.register(Box::new(cross_tier_deductions.clone()))?;
        registry.register(Box::new(model_failures.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;
        registry.register(Box::new(model_latency.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            questions_total,
            quota_denials,
            cross_tier_deductions,
            model_failures,
            tokens_total,
            cost_usd_total,
            model_latency,
        })
    }

    /// Record one answered question with its telemetry and cost
    pub fn record_answer(
        &self,
        tier: ModelTier,
        question_type: QuestionType,
        usage: &UsageTelemetry,
        cost: &CostBreakdown,
    ) -> Result<(), prometheus::Error> {
        self.questions_total
            .get_metric_with_label_values(&[tier.as_str(), question_type.as_str()])?
            .inc();

        for (kind, tokens) in [
            (TokenKind::Input, usage.input_tokens),
            (TokenKind::Output, usage.output_tokens),
            (TokenKind::CacheWrite, usage.cache_creation_input_tokens),
            (TokenKind::CacheRead, usage.cache_read_input_tokens),
        ] {
            self.tokens_total
                .get_metric_with_label_values(&[tier.as_str(), kind.as_str()])?
                .inc_by(tokens);
        }

        if !cost.total.is_finite() || cost.total < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Cost must be a non-negative finite number, got: {}",
                cost.total
            )));
        }
        self.cost_usd_total
            .get_metric_with_label_values(&[tier.as_str()])?
            .inc_by(cost.total);

        Ok(())
    }

    pub fn record_quota_denial(&self, reason: DenialReason) -> Result<(), prometheus::Error> {
        self.quota_denials
            .get_metric_with_label_values(&[reason.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_cross_tier_deduction(
        &self,
        charged_to: QuestionType,
    ) -> Result<(), prometheus::Error> {
        self.cross_tier_deductions
            .get_metric_with_label_values(&[charged_to.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_model_failure(&self, tier: ModelTier) -> Result<(), prometheus::Error> {
        self.model_failures
            .get_metric_with_label_values(&[tier.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_model_latency(
        &self,
        tier: ModelTier,
        latency_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be a non-negative finite number, got: {}",
                latency_ms
            )));
        }

        self.model_latency
            .get_metric_with_label_values(&[tier.as_str()])?
            .observe(latency_ms);
        Ok(())
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(error = %e, metric_family_count = metric_count, "Prometheus text encoder failed");
                prometheus::Error::Msg(format!(
                    "Failed to encode {} metric families: {}",
                    metric_count, e
                ))
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}

/// Log a metric recording failure without failing the request
pub fn log_recording_failure(operation: &'static str, result: Result<(), prometheus::Error>) {
    if let Err(e) = result {
        tracing::warn!(operation, error = %e, "Failed to record metric");
    }
}
