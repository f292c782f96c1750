//! Property-based tests for classification, costing and quota admission

use proptest::prelude::*;
use tutorgate::config::PricingConfig;
use tutorgate::cost::calculate_cost;
use tutorgate::ledger::{Quota, UsageCounts, UsageDecision};
use tutorgate::models::UsageTelemetry;
use tutorgate::router::{Classifier, QuestionType};

fn question_type() -> impl Strategy<Value = QuestionType> {
    prop_oneof![Just(QuestionType::Simple), Just(QuestionType::Complex)]
}

fn telemetry() -> impl Strategy<Value = UsageTelemetry> {
    (0u64..2_000_000, 0u64..200_000, 0u64..2_000_000, 0u64..2_000_000).prop_map(
        |(input, output, write, read)| UsageTelemetry {
            input_tokens: input,
            output_tokens: output,
            cache_creation_input_tokens: write,
            cache_read_input_tokens: read,
        },
    )
}

fn pricing() -> impl Strategy<Value = PricingConfig> {
    (0.01f64..100.0, 0.0f64..100.0).prop_map(|(input, output)| PricingConfig::new(input, output))
}

fn counts(simple: u32, complex: u32) -> UsageCounts {
    UsageCounts { simple, complex }
}

proptest! {
    #[test]
    fn classification_is_deterministic(text in "\\PC{0,200}") {
        let classifier = Classifier::new();
        prop_assert_eq!(classifier.classify(&text), classifier.classify(&text));
    }

    #[test]
    fn classification_ignores_surrounding_whitespace(text in "[a-zA-Z가-힣 ?]{1,60}") {
        let classifier = Classifier::new();
        let padded = format!("  {}\n", text);
        prop_assert_eq!(classifier.classify(&text), classifier.classify(&padded));
    }

    #[test]
    fn cost_is_non_negative_and_sums_components(usage in telemetry(), price in pricing()) {
        let cost = calculate_cost(&usage, &price);
        prop_assert!(cost.total >= 0.0);
        let sum = cost.input + cost.cache_write + cost.cache_read + cost.output;
        prop_assert!((cost.total - sum).abs() <= 1e-9 * sum.max(1.0));
    }

    #[test]
    fn cost_is_additive_across_usage(a in telemetry(), b in telemetry(), price in pricing()) {
        let combined = UsageTelemetry {
            input_tokens: a.input_tokens + b.input_tokens,
            output_tokens: a.output_tokens + b.output_tokens,
            cache_creation_input_tokens: a.cache_creation_input_tokens + b.cache_creation_input_tokens,
            cache_read_input_tokens: a.cache_read_input_tokens + b.cache_read_input_tokens,
        };
        let separate = calculate_cost(&a, &price).total + calculate_cost(&b, &price).total;
        let together = calculate_cost(&combined, &price).total;
        prop_assert!((separate - together).abs() <= 1e-9 * together.max(1.0));
    }

    #[test]
    fn admission_never_exceeds_limits(
        simple_limit in 1u32..20,
        complex_limit in 1u32..20,
        slack in 0u32..20,
        requests in prop::collection::vec(question_type(), 0..80),
    ) {
        let total_limit = (simple_limit + complex_limit).saturating_sub(slack).max(1);
        let quota = Quota::new(simple_limit, complex_limit, total_limit);
        let mut state = counts(0, 0);

        for kind in requests {
            match quota.evaluate(state, kind) {
                UsageDecision::Allowed { deduct_from } => {
                    let charged = deduct_from.unwrap_or(kind);
                    prop_assert!(deduct_from.is_none_or(|other| other != kind));
                    match charged {
                        QuestionType::Simple => state.simple += 1,
                        QuestionType::Complex => state.complex += 1,
                    }
                }
                UsageDecision::Denied(denial) => {
                    prop_assert!(!denial.allowed);
                    prop_assert_eq!(denial.usage.total, state.total());
                }
            }

            prop_assert!(state.simple <= simple_limit);
            prop_assert!(state.complex <= complex_limit);
            prop_assert!(state.total() <= total_limit);
        }
    }

    #[test]
    fn denial_only_when_no_headroom(
        simple in 0u32..10,
        complex in 0u32..10,
        kind in question_type(),
    ) {
        let quota = Quota::new(5, 5, 8);
        let current = counts(simple, complex);
        if let UsageDecision::Denied(_) = quota.evaluate(current, kind) {
            let own_full = current.get(kind) >= quota.limit_for(kind);
            let other = kind.other();
            let other_full = current.get(other) >= quota.limit_for(other);
            prop_assert!(current.total() >= quota.total_limit || (own_full && other_full));
        }
    }
}
