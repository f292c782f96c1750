//! Per-request cost estimation
//!
//! Converts token telemetry into USD using the tier's configured price table.
//! Formula per component: `tokens / 1_000_000 * price_per_mtok`. The total is
//! the plain sum of the four components.

use crate::config::{ModelsConfig, PricingConfig};
use crate::models::UsageTelemetry;
use crate::router::ModelTier;
use serde::Serialize;

const TOKENS_PER_MTOK: f64 = 1_000_000.0;

/// Cost of one completion, in USD
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub cache_write: f64,
    pub cache_read: f64,
    pub output: f64,
    pub total: f64,
}

impl CostBreakdown {
    /// Total rounded to whole micro-dollars
    pub fn total_micros(&self) -> u64 {
        (self.total * TOKENS_PER_MTOK).round() as u64
    }
}

fn component(tokens: u64, price_per_mtok: f64) -> f64 {
    tokens as f64 / TOKENS_PER_MTOK * price_per_mtok
}

/// Price the given telemetry against one price table
pub fn calculate_cost(usage: &UsageTelemetry, pricing: &PricingConfig) -> CostBreakdown {
    let input = component(usage.input_tokens, pricing.input_per_mtok());
    let cache_write = component(
        usage.cache_creation_input_tokens,
        pricing.cache_write_per_mtok(),
    );
    let cache_read = component(usage.cache_read_input_tokens, pricing.cache_read_per_mtok());
    let output = component(usage.output_tokens, pricing.output_per_mtok());

    CostBreakdown {
        input,
        cache_write,
        cache_read,
        output,
        total: input + cache_write + cache_read + output,
    }
}

/// Holds one price table per tier
///
/// Every tier has a table, so there is no fallback rate.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    fast: PricingConfig,
    thorough: PricingConfig,
}

impl CostEstimator {
    pub fn new(fast: PricingConfig, thorough: PricingConfig) -> Self {
        Self { fast, thorough }
    }

    pub fn from_config(models: &ModelsConfig) -> Self {
        Self::new(
            models.fast.pricing().clone(),
            models.thorough.pricing().clone(),
        )
    }

    pub fn pricing(&self, tier: ModelTier) -> &PricingConfig {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Thorough => &self.thorough,
        }
    }

    pub fn estimate(&self, usage: &UsageTelemetry, tier: ModelTier) -> CostBreakdown {
        calculate_cost(usage, self.pricing(tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> CostEstimator {
        CostEstimator::from_config(&ModelsConfig::default())
    }

    fn telemetry(input: u64, output: u64, cache_write: u64, cache_read: u64) -> UsageTelemetry {
        UsageTelemetry {
            input_tokens: input,
            output_tokens: output,
            cache_creation_input_tokens: cache_write,
            cache_read_input_tokens: cache_read,
        }
    }

    #[test]
    fn test_zero_telemetry_costs_nothing() {
        let cost = estimator().estimate(&UsageTelemetry::default(), ModelTier::Thorough);
        assert_eq!(cost.total, 0.0);
        assert_eq!(cost.total_micros(), 0);
    }

    #[test]
    fn test_thorough_tier_rates() {
        let cost = estimator().estimate(
            &telemetry(1_000_000, 1_000_000, 1_000_000, 1_000_000),
            ModelTier::Thorough,
        );
        assert!((cost.input - 3.0).abs() < 1e-9);
        assert!((cost.output - 15.0).abs() < 1e-9);
        assert!((cost.cache_write - 3.75).abs() < 1e-9);
        assert!((cost.cache_read - 0.3).abs() < 1e-9);
        assert!((cost.total - 22.05).abs() < 1e-9);
    }

    #[test]
    fn test_fast_tier_rates() {
        let cost = estimator().estimate(&telemetry(1000, 200, 0, 0), ModelTier::Fast);
        // 1000 * $1/MTok + 200 * $5/MTok = $0.001 + $0.001
        assert_eq!(cost.total_micros(), 2000);
    }

    #[test]
    fn test_cache_read_cheaper_than_fresh_input() {
        let est = estimator();
        for tier in [ModelTier::Fast, ModelTier::Thorough] {
            let fresh = est.estimate(&telemetry(5000, 0, 0, 0), tier);
            let cached = est.estimate(&telemetry(0, 0, 0, 5000), tier);
            assert!(cached.total < fresh.total);
        }
    }

    #[test]
    fn test_explicit_cache_prices_override_multipliers() {
        let pricing: PricingConfig = toml::from_str(
            r#"
input_per_mtok = 2.0
output_per_mtok = 8.0
cache_write_per_mtok = 2.0
cache_read_per_mtok = 0.5
"#,
        )
        .unwrap();
        let cost = calculate_cost(&telemetry(0, 0, 1_000_000, 1_000_000), &pricing);
        assert!((cost.cache_write - 2.0).abs() < 1e-9);
        assert!((cost.cache_read - 0.5).abs() < 1e-9);
    }
}
