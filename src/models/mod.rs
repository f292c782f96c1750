//! Model tier gateway
//!
//! Thin adapter over the external completion service. One call per request,
//! no retries; retry policy belongs to the router.

pub mod gateway;
pub mod wire;

pub use gateway::{AnthropicGateway, Completion, GatewayError, ModelGateway};

use serde::{Deserialize, Deserializer, Serialize};

/// Token counts reported by the completion service
///
/// Any field missing from a response, or sent as `null`, reads as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsageTelemetry {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cache_read_input_tokens: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}
