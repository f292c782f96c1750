//! Command-line interface for tutorgate

use clap::{Parser, Subcommand};

/// Tiered question routing and usage metering for an exam-prep tutor
#[derive(Parser)]
#[command(name = "tutorgate")]
#[command(version)]
#[command(about = "Tiered question routing and usage metering for an exam-prep tutor")]
#[command(
    long_about = "tutorgate answers student questions on a fast or thorough model tier \
    depending on question complexity, enforces monthly usage quotas with cross-tier \
    deduction, and estimates the cost of every answer."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# tutorgate configuration

[server]
# 0.0.0.0 for all interfaces, 127.0.0.1 for localhost only
host = "0.0.0.0"
port = 3000
# Default completion timeout in seconds (1-300); per-tier overrides in [timeouts]
request_timeout_seconds = 30
# Operator user ids (x-user-id) allowed to read /api/usage/summary
admin_users = []

[provider]
base_url = "https://api.anthropic.com/v1/messages"
api_version = "2023-06-01"
# Environment variable holding the API key
api_key_env = "ANTHROPIC_API_KEY"

# Fast tier: vocabulary lookups, one-line answers
[models.fast]
model = "claude-haiku-4-5-20251001"
max_tokens = 80
# system_prompt = "..."   # replaces the built-in template

[models.fast.pricing]
# USD per million tokens. Cache prices default to 1.25x / 0.1x input.
input_per_mtok = 1.0
output_per_mtok = 5.0

# Thorough tier: grammar, passage analysis, reasoning
[models.thorough]
model = "claude-sonnet-4-5-20250929"
max_tokens = 500
# Ceiling when expanding a previous answer
followup_max_tokens = 800

[models.thorough.pricing]
input_per_mtok = 3.0
output_per_mtok = 15.0
# cache_write_per_mtok = 3.75
# cache_read_per_mtok = 0.3

# Monthly limits per user. total_limit may not exceed simple + complex.
[quota]
simple_limit = 300
complex_limit = 300
total_limit = 600

[timeouts]
# fast = 10
# thorough = 60

# Retries apply to transient failures only and never consume extra quota.
# max_attempts = 1 disables retries.
[retry]
max_attempts = 1
backoff_ms = 100

[context_cache]
ttl_seconds = 3600
sweep_interval_seconds = 600

[observability]
# trace, debug, info, warn, error (RUST_LOG overrides)
log_level = "info"
"#
}
