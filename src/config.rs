//! Configuration management for tutorgate
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::ledger::Quota;
use crate::router::ModelTier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Upper bound for any timeout, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub quota: Quota,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub context_cache: ContextCacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Operator user ids allowed to read cross-user usage summaries
    #[serde(default)]
    pub admin_users: Vec<String>,
}

impl ServerConfig {
    /// Whether the caller may read period-wide usage
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_users.iter().any(|admin| admin == user_id)
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Completion service connection settings
///
/// The API key is never stored in the file; `api_key_env` names the
/// environment variable that holds it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

/// Per-tier model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    #[serde(default = "default_fast_tier")]
    pub fast: TierConfig,
    #[serde(default = "default_thorough_tier")]
    pub thorough: TierConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fast: default_fast_tier(),
            thorough: default_thorough_tier(),
        }
    }
}

fn default_fast_tier() -> TierConfig {
    TierConfig {
        model: "claude-haiku-4-5-20251001".to_string(),
        max_tokens: 80,
        followup_max_tokens: None,
        system_prompt: None,
        pricing: PricingConfig {
            input_per_mtok: 1.0,
            output_per_mtok: 5.0,
            cache_write_per_mtok: None,
            cache_read_per_mtok: None,
        },
    }
}

fn default_thorough_tier() -> TierConfig {
    TierConfig {
        model: "claude-sonnet-4-5-20250929".to_string(),
        max_tokens: 500,
        followup_max_tokens: Some(800),
        system_prompt: None,
        pricing: PricingConfig {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
            cache_write_per_mtok: None,
            cache_read_per_mtok: None,
        },
    }
}

/// Configuration for one model tier
///
/// All fields are private to enforce invariants. Configuration is loaded via
/// deserialization and validated via Config::validate().
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierConfig {
    model: String,
    max_tokens: u32,
    /// Ceiling for "expand previous answer" requests (thorough tier)
    #[serde(default)]
    followup_max_tokens: Option<u32>,
    /// Replaces the built-in system prompt for this tier
    #[serde(default)]
    system_prompt: Option<String>,
    pricing: PricingConfig,
}

impl TierConfig {
    /// Get the model identifier sent to the completion service
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the output-token ceiling for regular answers
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Get the output-token ceiling for follow-up expansion
    ///
    /// Falls back to `max_tokens` when not configured.
    pub fn followup_max_tokens(&self) -> u32 {
        self.followup_max_tokens.unwrap_or(self.max_tokens)
    }

    /// Get the system prompt override, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Get the price table
    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }
}

/// Token prices in USD per million tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    input_per_mtok: f64,
    output_per_mtok: f64,
    /// Defaults to 1.25x the input price
    #[serde(default)]
    cache_write_per_mtok: Option<f64>,
    /// Defaults to 0.1x the input price
    #[serde(default)]
    cache_read_per_mtok: Option<f64>,
}

/// Cache-write premium over the input price
pub const CACHE_WRITE_MULTIPLIER: f64 = 1.25;
/// Cache-read discount relative to the input price
pub const CACHE_READ_MULTIPLIER: f64 = 0.1;

impl PricingConfig {
    /// Create a price table, deriving cache prices from the input price
    pub fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
            cache_write_per_mtok: None,
            cache_read_per_mtok: None,
        }
    }

    pub fn input_per_mtok(&self) -> f64 {
        self.input_per_mtok
    }

    pub fn output_per_mtok(&self) -> f64 {
        self.output_per_mtok
    }

    pub fn cache_write_per_mtok(&self) -> f64 {
        self.cache_write_per_mtok
            .unwrap_or(self.input_per_mtok * CACHE_WRITE_MULTIPLIER)
    }

    pub fn cache_read_per_mtok(&self) -> f64 {
        self.cache_read_per_mtok
            .unwrap_or(self.input_per_mtok * CACHE_READ_MULTIPLIER)
    }
}

/// Router-level retry policy for transient completion failures
///
/// `max_attempts = 1` disables retries. Retries are quota-neutral: usage is
/// committed once, after the attempt that succeeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    1
}

fn default_backoff_ms() -> u64 {
    100
}

/// Page-context cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextCacheConfig {
    #[serde(default = "default_context_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for ContextCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_context_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_context_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    600
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-tier timeout overrides
///
/// If a tier timeout is not specified, the global
/// `server.request_timeout_seconds` is used.
///
/// Implements a validating `Deserialize`: every value must be in (0, 300]
/// seconds, and invalid values are rejected while parsing rather than later
/// in `Config::validate()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeoutsConfig {
    fast: Option<u64>,
    thorough: Option<u64>,
}

impl TimeoutsConfig {
    /// Create a new TimeoutsConfig with validated timeout values
    ///
    /// # Errors
    ///
    /// Returns an error if any timeout is zero or exceeds 300 seconds.
    pub fn new(fast: Option<u64>, thorough: Option<u64>) -> AppResult<Self> {
        for (tier_name, timeout_opt) in [("fast", fast), ("thorough", thorough)] {
            if let Some(timeout) = timeout_opt {
                if timeout == 0 {
                    return Err(AppError::Config(format!(
                        "timeouts.{} must be greater than 0, got {}",
                        tier_name, timeout
                    )));
                }
                if timeout > MAX_TIMEOUT_SECONDS {
                    return Err(AppError::Config(format!(
                        "timeouts.{} cannot exceed {} seconds, got {}",
                        tier_name, MAX_TIMEOUT_SECONDS, timeout
                    )));
                }
            }
        }
        Ok(Self { fast, thorough })
    }

    /// Get the fast tier timeout (if configured)
    pub fn fast(&self) -> Option<u64> {
        self.fast
    }

    /// Get the thorough tier timeout (if configured)
    pub fn thorough(&self) -> Option<u64> {
        self.thorough
    }
}

impl<'de> Deserialize<'de> for TimeoutsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};
        use std::fmt;

        #[derive(Deserialize)]
        #[serde(field_identifier, rename_all = "lowercase")]
        enum Field {
            Fast,
            Thorough,
        }

        struct TimeoutsConfigVisitor;

        impl<'de> Visitor<'de> for TimeoutsConfigVisitor {
            type Value = TimeoutsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a struct with optional timeout fields (fast, thorough)")
            }

            fn visit_map<V>(self, mut map: V) -> Result<TimeoutsConfig, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut fast = None;
                let mut thorough = None;

                while let Some(key) = map.next_key()? {
                    match key {
                        Field::Fast => {
                            if fast.is_some() {
                                return Err(de::Error::duplicate_field("fast"));
                            }
                            fast = Some(map.next_value()?);
                        }
                        Field::Thorough => {
                            if thorough.is_some() {
                                return Err(de::Error::duplicate_field("thorough"));
                            }
                            thorough = Some(map.next_value()?);
                        }
                    }
                }

                TimeoutsConfig::new(fast, thorough)
                    .map_err(|e| de::Error::custom(format!("Invalid timeout configuration: {}", e)))
            }
        }

        deserializer.deserialize_struct(
            "TimeoutsConfig",
            &["fast", "thorough"],
            TimeoutsConfigVisitor,
        )
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Get the configuration for a model tier
    pub fn tier(&self, tier: ModelTier) -> &TierConfig {
        match tier {
            ModelTier::Fast => &self.models.fast,
            ModelTier::Thorough => &self.models.thorough,
        }
    }

    /// Get timeout for a specific model tier
    ///
    /// Returns the per-tier timeout if configured, otherwise falls back to
    /// the global `server.request_timeout_seconds`.
    pub fn timeout_for_tier(&self, tier: ModelTier) -> u64 {
        let tier_timeout = match tier {
            ModelTier::Fast => self.timeouts.fast(),
            ModelTier::Thorough => self.timeouts.thorough(),
        };

        match tier_timeout {
            Some(timeout) => {
                tracing::debug!(
                    tier = %tier,
                    timeout_seconds = timeout,
                    "Using tier-specific timeout override"
                );
                timeout
            }
            None => self.server.request_timeout_seconds,
        }
    }

    /// Validate configuration after parsing
    ///
    /// Called automatically by `from_file()` and `from_str()`, and can be
    /// called explicitly when a Config is built or mutated in code.
    pub fn validate(&self) -> AppResult<()> {
        for (tier_name, tier) in [
            ("fast", &self.models.fast),
            ("thorough", &self.models.thorough),
        ] {
            if tier.model.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "models.{}.model cannot be empty",
                    tier_name
                )));
            }

            if tier.max_tokens == 0 {
                return Err(AppError::Config(format!(
                    "models.{}.max_tokens must be greater than 0",
                    tier_name
                )));
            }

            if tier.followup_max_tokens == Some(0) {
                return Err(AppError::Config(format!(
                    "models.{}.followup_max_tokens must be greater than 0",
                    tier_name
                )));
            }

            let pricing = &tier.pricing;
            for (field, price) in [
                ("input_per_mtok", pricing.input_per_mtok()),
                ("output_per_mtok", pricing.output_per_mtok()),
                ("cache_write_per_mtok", pricing.cache_write_per_mtok()),
                ("cache_read_per_mtok", pricing.cache_read_per_mtok()),
            ] {
                if !price.is_finite() || price < 0.0 {
                    return Err(AppError::Config(format!(
                        "models.{}.pricing.{} must be a non-negative finite number, got {}",
                        tier_name, field, price
                    )));
                }
            }

            if pricing.input_per_mtok() > 0.0
                && pricing.cache_read_per_mtok() >= pricing.input_per_mtok()
            {
                return Err(AppError::Config(format!(
                    "models.{}.pricing.cache_read_per_mtok ({}) must be lower than input_per_mtok ({})",
                    tier_name,
                    pricing.cache_read_per_mtok(),
                    pricing.input_per_mtok()
                )));
            }
        }

        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                self.provider.base_url
            )));
        }

        self.quota.validate()?;

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.context_cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "context_cache.ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.context_cache.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "context_cache.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "request_timeout_seconds cannot exceed {} seconds, got {}",
                MAX_TIMEOUT_SECONDS, self.server.request_timeout_seconds
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
