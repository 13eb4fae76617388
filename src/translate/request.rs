//! Translate client chat-completion requests into upstream requests.
//!
//! Applies model routing, token and temperature policy, the optional system
//! preamble and the thinking extension. Pure: no I/O.

use super::client_types::{ChatCompletionRequest, ChatMessage, Role};
use super::upstream_types::{TemplateKwargs, UpstreamMessage, UpstreamRequest};
use crate::config::{LimitsConfig, RelayConfig};
use crate::error::{RelayError, Result};
use crate::models::resolve_model;

pub fn normalize_request(req: &ChatCompletionRequest, config: &RelayConfig) -> Result<UpstreamRequest> {
    if req.messages.is_empty() {
        return Err(RelayError::invalid_request("'messages' must contain at least one message"));
    }

    let model = resolve_model(&config.models, &config.default_model, &req.model).to_string();

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(ref preamble) = config.prompt.system_preamble {
        messages.push(UpstreamMessage {
            role: role_name(Role::System).to_string(),
            content: preamble.clone(),
        });
    }
    messages.extend(req.messages.iter().map(translate_message));

    let chat_template_kwargs = config
        .reasoning
        .thinking_mode
        .then_some(TemplateKwargs { thinking: true });

    Ok(UpstreamRequest {
        model,
        messages,
        temperature: clamp_temperature(req.temperature, &config.limits),
        max_tokens: clamp_max_tokens(req.max_tokens, &config.limits),
        stream: req.is_streaming() || config.upstream.force_stream,
        top_p: req.top_p,
        stop: req.stop.clone(),
        chat_template_kwargs,
    })
}

/// Unset or zero takes the default; anything else is capped at the ceiling.
#[must_use]
pub fn clamp_max_tokens(requested: Option<u64>, limits: &LimitsConfig) -> u32 {
    let ceiling = limits.max_tokens_ceiling.max(1);
    match requested {
        None | Some(0) => limits.default_max_tokens.clamp(1, ceiling),
        Some(n) => u32::try_from(n).map_or(ceiling, |n| n.min(ceiling)),
    }
}

#[must_use]
pub fn clamp_temperature(requested: Option<f64>, limits: &LimitsConfig) -> f64 {
    match requested {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => limits.default_temperature,
    }
}

fn translate_message(msg: &ChatMessage) -> UpstreamMessage {
    UpstreamMessage {
        role: role_name(msg.role).to_string(),
        content: msg.content.as_text(),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}
