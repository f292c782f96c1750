//! Anthropic Messages API wire types
//!
//! Request types borrow from the assembled [`PromptRequest`]; response types
//! tolerate missing usage fields and unknown content blocks.

use super::UsageTelemetry;
use crate::prompt::{PromptRequest, Segment};
use serde::{Deserialize, Serialize};

/// `{"type": "ephemeral"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self { kind: "ephemeral" }
    }
}

/// A text block in `system` or in message content
#[derive(Debug, Clone, Serialize)]
pub struct TextBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl<'a> From<&'a Segment> for TextBlock<'a> {
    fn from(segment: &'a Segment) -> Self {
        Self {
            kind: "text",
            text: &segment.text,
            cache_control: segment.is_cached().then(CacheControl::ephemeral),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: Vec<TextBlock<'a>>,
}

/// Body of `POST /v1/messages`
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: Vec<TextBlock<'a>>,
    pub messages: Vec<Message<'a>>,
}

impl<'a> MessageRequest<'a> {
    pub fn new(model: &'a str, prompt: &'a PromptRequest) -> Self {
        Self {
            model,
            max_tokens: prompt.max_tokens,
            system: prompt.system.iter().map(TextBlock::from).collect(),
            messages: vec![Message {
                role: "user",
                content: prompt.user.iter().map(TextBlock::from).collect(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: UsageTelemetry,
}

impl MessageResponse {
    /// Text blocks concatenated and trimmed
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<String>()
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
