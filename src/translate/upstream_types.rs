//! Types for the upstream provider's chat endpoint.
//!
//! The upstream speaks an OpenAI-shaped dialect with two additions: a separate
//! `reasoning_content` channel next to `content`, and provider extension
//! parameters (`chat_template_kwargs`). Response schemas are explicit: a body
//! without `choices` does not parse.

use serde::{Deserialize, Serialize};

use super::client_types::{FinishReason, StopSequences, Usage};

// ---------------------------------------------------------------------------
// Request types (what we send TO the upstream)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_template_kwargs: Option<TemplateKwargs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateKwargs {
    pub thinking: bool,
}

// ---------------------------------------------------------------------------
// Buffered response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub index: u32,
    pub message: UpstreamChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

// ---------------------------------------------------------------------------
// Streaming frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    pub choices: Vec<UpstreamChunkChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: UpstreamDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// Payload that terminates an upstream event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded upstream event.
#[derive(Debug, Clone)]
pub enum UpstreamFrame {
    Chunk(UpstreamChunk),
    Done,
}

impl UpstreamFrame {
    /// Decode the payload of one event frame.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        if payload.trim() == DONE_SENTINEL {
            return Ok(Self::Done);
        }
        serde_json::from_str(payload).map(Self::Chunk)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamErrorResponse {
    pub error: UpstreamErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamErrorDetail {
    pub message: String,
}
