//! Metered question answering
//!
//! Orchestrates one request: resolve the question type, take a ledger
//! admission, assemble the prompt, call the gateway (with timeout and the
//! configured retry policy), commit usage and price the response.
//!
//! Usage is committed only after a successful completion. Every failure path,
//! including timeouts and a dropped request future, releases the admission
//! without charging it.

use super::{Classifier, ModelTier, Question, QuestionType};
use crate::config::{Config, RetryConfig};
use crate::cost::{CostBreakdown, CostEstimator};
use crate::error::{AppError, AppResult};
use crate::ledger::UsageLedger;
use crate::metrics::{Metrics, log_recording_failure};
use crate::models::{Completion, ModelGateway, UsageTelemetry};
use crate::prompt::{PromptAssembler, PromptRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maximum backoff between attempts (30 seconds)
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff for the given attempt (1-indexed)
///
/// `base * 2^(attempt-1)`, capped at [`MAX_BACKOFF_MS`].
pub fn calculate_backoff(base_ms: u64, attempt: usize) -> u64 {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_BACKOFF_MS)
}

/// Result of an answered question
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub tier: ModelTier,
    pub question_type: QuestionType,
    /// Counter charged instead of `question_type`, if any
    pub deducted_from: Option<QuestionType>,
    pub model: String,
    pub telemetry: UsageTelemetry,
    pub cost: CostBreakdown,
    /// Wall-clock time spent in the completion call(s)
    pub elapsed_ms: u64,
}

/// Tiered, metered question router
pub struct TutorRouter {
    classifier: Classifier,
    assembler: PromptAssembler,
    estimator: CostEstimator,
    gateway: Arc<dyn ModelGateway>,
    ledger: Arc<UsageLedger>,
    retry: RetryConfig,
    fast_timeout_seconds: u64,
    thorough_timeout_seconds: u64,
    metrics: Option<Arc<Metrics>>,
}

impl TutorRouter {
    /// Create a router from configuration
    pub fn new(config: &Config, gateway: Arc<dyn ModelGateway>, ledger: Arc<UsageLedger>) -> Self {
        Self {
            classifier: Classifier::new(),
            assembler: PromptAssembler::from_config(&config.models),
            estimator: CostEstimator::from_config(&config.models),
            gateway,
            ledger,
            retry: config.retry.clone(),
            fast_timeout_seconds: config.timeout_for_tier(ModelTier::Fast),
            thorough_timeout_seconds: config.timeout_for_tier(ModelTier::Thorough),
            metrics: None,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn timeout_for(&self, tier: ModelTier) -> u64 {
        match tier {
            ModelTier::Fast => self.fast_timeout_seconds,
            ModelTier::Thorough => self.thorough_timeout_seconds,
        }
    }

    /// Resolve the question type for a request
    ///
    /// A caller-supplied type is trusted as-is. Follow-up requests are always
    /// complex; combining one with an explicit `simple` type is rejected.
    pub fn resolve_type(&self, question: &Question) -> AppResult<QuestionType> {
        if question.is_follow_up() {
            return match question.question_type {
                Some(QuestionType::Simple) => Err(AppError::Validation(
                    "previous_answer cannot be combined with question_type 'simple'".to_string(),
                )),
                _ => Ok(QuestionType::Complex),
            };
        }

        Ok(match question.question_type {
            Some(question_type) => question_type,
            None => {
                let classification = self.classifier.explain(&question.text);
                tracing::debug!(
                    question_type = %classification.question_type,
                    matched = ?classification.matched,
                    "Question classified"
                );
                classification.question_type
            }
        })
    }

    /// Answer a question for a user
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` for a blank question or an invalid combination
    /// - `AppError::QuotaExceeded` when the ledger denies the request
    /// - `AppError::ModelInvocation` / `AppError::ModelTimeout` when every attempt failed
    /// - `AppError::LedgerUnavailable` when the usage store fails
    pub async fn answer(&self, user_id: &str, question: &Question) -> AppResult<Answer> {
        if question.text.trim().is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }

        let question_type = self.resolve_type(question)?;
        self.run(user_id, question_type, |assembler| {
            assembler.assemble(
                question_type.tier(),
                &question.text,
                question.context.as_deref(),
                question.previous_answer.as_deref(),
            )
        })
        .await
    }

    /// Detailed vocabulary card for a word, metered as a simple question
    pub async fn word_detail(&self, user_id: &str, word: &str) -> AppResult<Answer> {
        if word.trim().is_empty() {
            return Err(AppError::Validation("word cannot be empty".to_string()));
        }

        self.run(user_id, QuestionType::Simple, |assembler| {
            assembler.word_detail(word)
        })
        .await
    }

    async fn run<F>(&self, user_id: &str, question_type: QuestionType, build: F) -> AppResult<Answer>
    where
        F: FnOnce(&PromptAssembler) -> AppResult<PromptRequest>,
    {
        let admission = match self.ledger.admit(user_id, question_type).await {
            Ok(admission) => admission,
            Err(AppError::QuotaExceeded(denial)) => {
                if let Some(metrics) = &self.metrics {
                    log_recording_failure(
                        "record_quota_denial",
                        metrics.record_quota_denial(denial.reason),
                    );
                }
                return Err(AppError::QuotaExceeded(denial));
            }
            Err(e) => return Err(e),
        };

        let prompt = build(&self.assembler)?;
        let tier = prompt.tier;

        let (completion, elapsed_ms) = self.invoke_with_retry(tier, &prompt).await?;

        let deducted_from = admission.deduct_from();
        admission.commit().await?;

        let cost = self.estimator.estimate(&completion.usage, tier);

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            question_type = %question_type,
            deducted_from = ?deducted_from,
            model = %completion.model,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            cache_write_tokens = completion.usage.cache_creation_input_tokens,
            cache_read_tokens = completion.usage.cache_read_input_tokens,
            cost_usd = cost.total,
            elapsed_ms,
            "Question answered"
        );

        if let Some(metrics) = &self.metrics {
            log_recording_failure(
                "record_answer",
                metrics.record_answer(tier, question_type, &completion.usage, &cost),
            );
            if let Some(charged_to) = deducted_from {
                log_recording_failure(
                    "record_cross_tier_deduction",
                    metrics.record_cross_tier_deduction(charged_to),
                );
            }
        }

        Ok(Answer {
            answer: completion.text,
            tier,
            question_type,
            deducted_from,
            model: completion.model,
            telemetry: completion.usage,
            cost,
            elapsed_ms,
        })
    }

    async fn invoke_with_retry(
        &self,
        tier: ModelTier,
        prompt: &PromptRequest,
    ) -> AppResult<(Completion, u64)> {
        let timeout_seconds = self.timeout_for(tier);
        let max_attempts = self.retry.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let attempt_started = Instant::now();
            let result = tokio::time::timeout(
                Duration::from_secs(timeout_seconds),
                self.gateway.invoke(tier, prompt),
            )
            .await;
            let attempt_ms = attempt_started.elapsed().as_secs_f64() * 1000.0;

            let err = match result {
                Ok(Ok(completion)) => {
                    if let Some(metrics) = &self.metrics {
                        log_recording_failure(
                            "record_model_latency",
                            metrics.record_model_latency(tier, attempt_ms),
                        );
                    }
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    return Ok((completion, elapsed_ms));
                }
                Ok(Err(e)) => e.into_app_error(tier),
                Err(_) => AppError::ModelTimeout {
                    tier,
                    timeout_seconds,
                },
            };

            if let Some(metrics) = &self.metrics {
                log_recording_failure("record_model_failure", metrics.record_model_failure(tier));
            }

            if !err.is_retryable() || attempt >= max_attempts {
                tracing::error!(
                    tier = %tier,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Completion failed, no usage recorded"
                );
                return Err(err);
            }

            let backoff_ms = calculate_backoff(self.retry.backoff_ms, attempt);
            tracing::warn!(
                tier = %tier,
                attempt,
                max_attempts,
                backoff_ms,
                error = %err,
                "Transient completion failure, retrying"
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            attempt += 1;
        }
    }
}
