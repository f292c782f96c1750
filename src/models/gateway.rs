//! Completion service client
//!
//! `ModelGateway` is the seam the router talks to; `AnthropicGateway` is the
//! production implementation over reqwest.

use super::UsageTelemetry;
use super::wire::{ApiErrorResponse, MessageRequest, MessageResponse};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::prompt::PromptRequest;
use crate::router::ModelTier;
use async_trait::async_trait;
use thiserror::Error;

/// Generated answer plus telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: UsageTelemetry,
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Failure of a single completion call
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode API response: {0}")]
    Decode(String),

    #[error("API returned no text content")]
    EmptyResponse,
}

impl GatewayError {
    /// Transport errors, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Decode(_) | Self::EmptyResponse => false,
        }
    }

    /// Convert into the application error for the given tier
    pub fn into_app_error(self, tier: ModelTier) -> AppError {
        AppError::ModelInvocation {
            tier,
            retryable: self.is_retryable(),
            reason: self.to_string(),
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Invokes the completion service for one tier
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(
        &self,
        tier: ModelTier,
        request: &PromptRequest,
    ) -> Result<Completion, GatewayError>;
}

/// Anthropic Messages API client
#[derive(Debug, Clone)]
pub struct AnthropicGateway {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    api_key: String,
    fast_model: String,
    thorough_model: String,
}

impl AnthropicGateway {
    /// Create a gateway
    ///
    /// # Arguments
    ///
    /// * `base_url` - Full messages endpoint URL
    /// * `api_version` - Value of the `anthropic-version` header
    /// * `api_key` - Value of the `x-api-key` header
    /// * `fast_model` / `thorough_model` - Model identifiers per tier
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
        fast_model: impl Into<String>,
        thorough_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_version: api_version.into(),
            api_key: api_key.into(),
            fast_model: fast_model.into(),
            thorough_model: thorough_model.into(),
        }
    }

    /// Create a gateway from configuration, reading the key from the environment
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the environment variable named by
    /// `provider.api_key_env` is unset or empty.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let key_var = &config.provider.api_key_env;
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(format!("environment variable {} is not set", key_var))
            })?;

        Ok(Self::new(
            config.provider.base_url.clone(),
            config.provider.api_version.clone(),
            api_key,
            config.tier(ModelTier::Fast).model(),
            config.tier(ModelTier::Thorough).model(),
        ))
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Thorough => &self.thorough_model,
        }
    }
}

#[async_trait]
impl ModelGateway for AnthropicGateway {
    async fn invoke(
        &self,
        tier: ModelTier,
        request: &PromptRequest,
    ) -> Result<Completion, GatewayError> {
        let model = self.model_for(tier);
        let body = MessageRequest::new(model, request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        tracing::debug!(tier = %tier, model = %model, status = %status, "Completion response received");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!("{}: {}", api_err.error.kind, api_err.error.message),
                Err(_) => text,
            };
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        let text = parsed.text();
        if text.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }

        Ok(Completion {
            text,
            usage: parsed.usage,
            model: if parsed.model.is_empty() {
                model.to_string()
            } else {
                parsed.model
            },
            stop_reason: parsed.stop_reason,
        })
    }
}
