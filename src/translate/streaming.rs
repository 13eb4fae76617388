//! State machine for translating upstream stream frames into client chunks.
//!
//! The [`StreamTranslator`] handles one upstream stream. It turns each decoded
//! [`UpstreamFrame`] into exactly one [`OutboundItem`], keeping the per-choice
//! reasoning phase between frames, and refuses to emit anything after the
//! terminal `[DONE]`.

use std::collections::BTreeMap;

use super::client_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta, ErrorResponse, Role};
use super::reasoning::ReasoningPhase;
use super::upstream_types::{UpstreamChunk, UpstreamChunkChoice, UpstreamFrame};

/// One unit written to the client event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundItem {
    Chunk(ChatCompletionChunk),
    Error(ErrorResponse),
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChoiceState {
    phase: ReasoningPhase,
    role_sent: bool,
}

/// Usage:
///   let mut translator = StreamTranslator::new("gpt-4o", true);
///   for frame in frames {
///       if let Some(item) = translator.step(frame) {
///           // emit item
///       }
///   }
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    id: String,
    created: i64,
    show_reasoning: bool,
    choices: BTreeMap<u32, ChoiceState>,
    finished: bool,
}

impl StreamTranslator {
    pub fn new(model: &str, show_reasoning: bool) -> Self {
        Self {
            model: model.to_string(),
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            show_reasoning,
            choices: BTreeMap::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Translate one frame. Returns `None` once the stream has finished.
    pub fn step(&mut self, frame: UpstreamFrame) -> Option<OutboundItem> {
        if self.finished {
            return None;
        }
        match frame {
            UpstreamFrame::Chunk(chunk) => Some(OutboundItem::Chunk(self.translate_chunk(&chunk))),
            UpstreamFrame::Done => Some(self.finish()),
        }
    }

    /// Terminate the stream with `[DONE]`.
    pub fn finish(&mut self) -> OutboundItem {
        self.finished = true;
        OutboundItem::Done
    }

    /// Close every reasoning block still open, as one chunk. Call before
    /// `finish` or `fail` when the upstream ended without a finish reason.
    pub fn close_reasoning(&mut self) -> Option<OutboundItem> {
        if self.finished || !self.show_reasoning {
            return None;
        }

        let choices: Vec<ChunkChoice> = self
            .choices
            .iter_mut()
            .filter_map(|(&index, state)| {
                let content = state.phase.render(None, None, true)?;
                Some(ChunkChoice {
                    index,
                    delta: ChunkDelta { role: None, content: Some(content) },
                    finish_reason: None,
                })
            })
            .collect();

        if choices.is_empty() {
            return None;
        }
        Some(OutboundItem::Chunk(ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage: None,
        }))
    }

    /// Terminate the stream with an error frame; the caller still owes `[DONE]`.
    pub fn fail(&mut self, error: ErrorResponse) -> OutboundItem {
        self.finished = true;
        OutboundItem::Error(error)
    }

    fn translate_chunk(&mut self, chunk: &UpstreamChunk) -> ChatCompletionChunk {
        if let Some(ref id) = chunk.id {
            self.id.clone_from(id);
        }
        if let Some(created) = chunk.created {
            self.created = created;
        }

        let choices = chunk
            .choices
            .iter()
            .map(|choice| self.translate_choice(choice))
            .collect();

        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage: chunk.usage.clone(),
        }
    }

    fn translate_choice(&mut self, choice: &UpstreamChunkChoice) -> ChunkChoice {
        let show_reasoning = self.show_reasoning;
        let state = self.state_for(choice.index);

        let content = if show_reasoning {
            state.phase.render(
                choice.delta.reasoning_content.as_deref(),
                choice.delta.content.as_deref(),
                choice.finish_reason.is_some(),
            )
        } else {
            choice.delta.content.clone()
        };

        let role = (!state.role_sent).then_some(Role::Assistant);
        state.role_sent = true;

        ChunkChoice {
            index: choice.index,
            delta: ChunkDelta { role, content },
            finish_reason: choice.finish_reason.map(|r| r.normalized()),
        }
    }

    fn state_for(&mut self, index: u32) -> &mut ChoiceState {
        self.choices.entry(index).or_default()
    }
}
