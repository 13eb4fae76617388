use std::collections::BTreeMap;

use super::client_types::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ChunkChoice, ChunkDelta, FinishReason,
    ResponseMessage, Role, Usage,
};
use super::reasoning::prepend_reasoning;
use super::upstream_types::{UpstreamChunk, UpstreamResponse};
use crate::error::{RelayError, Result};

/// Parse a buffered upstream body and translate it in one shot.
/// `model` is what the client originally asked for.
pub fn assemble_response(body: &[u8], model: &str, show_reasoning: bool) -> Result<ChatCompletionResponse> {
    let upstream: UpstreamResponse = serde_json::from_slice(body).map_err(|e| {
        RelayError::malformed(format!(
            "{e}. Body: {}",
            truncate(&String::from_utf8_lossy(body), 300)
        ))
    })?;
    Ok(translate_response(upstream, model, show_reasoning))
}

/// Translate a parsed upstream response. Choices map 1:1 and content is never null.
#[must_use]
pub fn translate_response(upstream: UpstreamResponse, model: &str, show_reasoning: bool) -> ChatCompletionResponse {
    let choices = upstream
        .choices
        .into_iter()
        .map(|choice| {
            let content = choice.message.content.unwrap_or_default();
            let content = if show_reasoning {
                prepend_reasoning(choice.message.reasoning_content.as_deref(), &content)
            } else {
                content
            };
            Choice {
                index: choice.index,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: Some(choice.finish_reason.map_or(FinishReason::Stop, FinishReason::normalized)),
            }
        })
        .collect();

    ChatCompletionResponse {
        id: upstream.id.unwrap_or_else(new_completion_id),
        object: "chat.completion".to_string(),
        created: upstream.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        model: model.to_string(),
        choices,
        usage: upstream.usage.unwrap_or_default(),
    }
}

#[derive(Debug, Default)]
struct FoldedChoice {
    content: String,
    reasoning: String,
    finish_reason: Option<FinishReason>,
}

/// Folds a streamed upstream reply into one response, for clients that did
/// not ask to stream while the upstream streamed anyway.
#[derive(Debug)]
pub struct ResponseFolder {
    model: String,
    show_reasoning: bool,
    id: Option<String>,
    created: Option<i64>,
    usage: Option<Usage>,
    choices: BTreeMap<u32, FoldedChoice>,
}

impl ResponseFolder {
    pub fn new(model: &str, show_reasoning: bool) -> Self {
        Self {
            model: model.to_string(),
            show_reasoning,
            id: None,
            created: None,
            usage: None,
            choices: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, chunk: UpstreamChunk) {
        if self.id.is_none() {
            self.id = chunk.id;
        }
        if self.created.is_none() {
            self.created = chunk.created;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in chunk.choices {
            let folded = self.choices.entry(choice.index).or_default();
            if let Some(content) = choice.delta.content {
                folded.content.push_str(&content);
            }
            if let Some(reasoning) = choice.delta.reasoning_content {
                folded.reasoning.push_str(&reasoning);
            }
            if choice.finish_reason.is_some() {
                folded.finish_reason = choice.finish_reason;
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> ChatCompletionResponse {
        let show_reasoning = self.show_reasoning;
        let choices = self
            .choices
            .into_iter()
            .map(|(index, folded)| {
                let content = if show_reasoning {
                    prepend_reasoning(Some(&folded.reasoning), &folded.content)
                } else {
                    folded.content
                };
                Choice {
                    index,
                    message: ResponseMessage {
                        role: Role::Assistant,
                        content,
                    },
                    finish_reason: Some(folded.finish_reason.map_or(FinishReason::Stop, FinishReason::normalized)),
                }
            })
            .collect();

        ChatCompletionResponse {
            id: self.id.unwrap_or_else(new_completion_id),
            object: "chat.completion".to_string(),
            created: self.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
            model: self.model,
            choices,
            usage: self.usage.unwrap_or_default(),
        }
    }
}

/// Replay a complete response as stream chunks, one per choice, for
/// streaming clients whose upstream answered with a buffered body.
#[must_use]
pub fn replay_as_chunks(resp: &ChatCompletionResponse) -> Vec<ChatCompletionChunk> {
    let last = resp.choices.len().saturating_sub(1);
    resp.choices
        .iter()
        .enumerate()
        .map(|(i, choice)| ChatCompletionChunk {
            id: resp.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: resp.created,
            model: resp.model.clone(),
            choices: vec![ChunkChoice {
                index: choice.index,
                delta: ChunkDelta {
                    role: Some(Role::Assistant),
                    content: Some(choice.message.content.clone()),
                },
                finish_reason: choice.finish_reason,
            }],
            usage: (i == last).then(|| resp.usage.clone()),
        })
        .collect()
}

fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
