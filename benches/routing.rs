//! Routing performance benchmarks
//!
//! Measures the non-network work done per question: classification, prompt
//! assembly, quota evaluation, cost estimation and a full in-memory ledger
//! round trip.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::str::FromStr;
use std::sync::Arc;
use tutorgate::config::{Config, ModelsConfig};
use tutorgate::cost::CostEstimator;
use tutorgate::ledger::{MemoryUsageStore, Quota, UsageCounts, UsageLedger};
use tutorgate::models::UsageTelemetry;
use tutorgate::prompt::PromptAssembler;
use tutorgate::router::{Classifier, ModelTier, QuestionType};

/// Benchmark classification across question shapes
///
/// Simple signatures are checked first, so lookups return earliest and
/// unmatched questions walk every signature.
fn bench_classification(c: &mut Criterion) {
    let questions = vec![
        ("lookup", "predictive?"),
        ("meaning", "resilience의 의미가 뭐예요?"),
        ("reasoning", "왜 ③번이 아니라 ④번이 정답인가요?"),
        (
            "unmatched",
            "이 문장에서 which가 가리키는 것은 앞 절 전체인가요 아니면 바로 앞의 명사인가요",
        ),
    ];

    let classifier = Classifier::new();
    let mut group = c.benchmark_group("classification");

    for (name, question) in questions {
        group.bench_with_input(BenchmarkId::from_parameter(name), &question, |b, q| {
            b.iter(|| classifier.classify(black_box(q)));
        });
    }

    group.finish();
}

/// Benchmark prompt assembly for both tiers
fn bench_prompt_assembly(c: &mut Criterion) {
    let assembler = PromptAssembler::from_config(&ModelsConfig::default());
    let context = "해설: ".repeat(500);

    let mut group = c.benchmark_group("prompt_assembly");
    group.bench_function("fast_lookup", |b| {
        b.iter(|| assembler.assemble(ModelTier::Fast, black_box("abandon 뜻이 뭐예요?"), None, None));
    });
    group.bench_function("thorough_with_context", |b| {
        b.iter(|| {
            assembler.assemble(
                ModelTier::Thorough,
                black_box("왜 ②가 정답인가요?"),
                Some(&context),
                None,
            )
        });
    });
    group.bench_function("thorough_follow_up", |b| {
        b.iter(|| {
            assembler.assemble(
                ModelTier::Thorough,
                black_box("더 자세히 설명해주세요"),
                Some(&context),
                Some("앞 절 전체를 가리킵니다."),
            )
        });
    });
    group.finish();
}

/// Benchmark the pure admission decision
fn bench_quota_evaluation(c: &mut Criterion) {
    let quota = Quota::new(300, 300, 600);
    let counts = UsageCounts {
        simple: 300,
        complex: 120,
    };

    c.bench_function("quota_evaluation", |b| {
        b.iter(|| quota.evaluate(black_box(counts), black_box(QuestionType::Simple)));
    });
}

/// Benchmark cost estimation from token telemetry
fn bench_cost_estimation(c: &mut Criterion) {
    let estimator = CostEstimator::from_config(&ModelsConfig::default());
    let usage = UsageTelemetry {
        input_tokens: 1_200,
        output_tokens: 450,
        cache_creation_input_tokens: 2_000,
        cache_read_input_tokens: 8_000,
    };

    c.bench_function("cost_estimation", |b| {
        b.iter(|| estimator.estimate(black_box(&usage), ModelTier::Thorough));
    });
}

/// Benchmark configuration parsing and validation
///
/// Runs once at startup; included to catch pathological validation cost.
fn bench_config_parsing(c: &mut Criterion) {
    let toml_str = r#"
[server]
host = "127.0.0.1"
port = 3000

[quota]
simple_limit = 300
complex_limit = 300
total_limit = 600

[timeouts]
fast = 10
thorough = 60
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| Config::from_str(black_box(toml_str)));
    });
}

/// Benchmark admit + commit against the in-memory store
fn bench_ledger_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("failed to build tokio runtime");
    let ledger = Arc::new(UsageLedger::new(
        Arc::new(MemoryUsageStore::new()),
        Quota::new(u32::MAX / 2, u32::MAX / 2, u32::MAX - 1),
    ));

    c.bench_function("ledger_admit_commit", |b| {
        b.to_async(&runtime).iter(|| {
            let ledger = Arc::clone(&ledger);
            async move {
                if let Ok(admission) = ledger.admit("bench-user", QuestionType::Simple).await {
                    let _ = admission.commit().await;
                }
            }
        });
    });
}

criterion_group!(
    benches,
    bench_classification,
    bench_prompt_assembly,
    bench_quota_evaluation,
    bench_cost_estimation,
    bench_config_parsing,
    bench_ledger_round_trip,
);
criterion_main!(benches);
