//! Reasoning display.
//!
//! When display is enabled, upstream reasoning is shown to clients inline,
//! wrapped in `<think>` tags ahead of the answer. Streams track where they are
//! with a [`ReasoningPhase`] per choice.

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "\n</think>\n\n";

/// Position of one streamed choice relative to its reasoning block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReasoningPhase {
    #[default]
    NoReasoningYet,
    InReasoning,
    Done,
}

impl ReasoningPhase {
    /// Render one delta's reasoning and content into client text, advancing
    /// the phase. Returns `None` when there is nothing to show.
    pub fn render(
        &mut self,
        reasoning: Option<&str>,
        content: Option<&str>,
        finished: bool,
    ) -> Option<String> {
        let mut out = String::new();

        if let Some(r) = reasoning.filter(|r| !r.is_empty()) {
            if *self != Self::InReasoning {
                out.push_str(THINK_OPEN);
                *self = Self::InReasoning;
            }
            out.push_str(r);
        }

        if let Some(c) = content.filter(|c| !c.is_empty()) {
            self.close_into(&mut out);
            out.push_str(c);
        }

        if finished {
            self.close_into(&mut out);
        }

        (!out.is_empty()).then_some(out)
    }

    fn close_into(&mut self, out: &mut String) {
        if *self == Self::InReasoning {
            out.push_str(THINK_CLOSE);
            *self = Self::Done;
        }
    }
}

/// One-shot form for buffered responses: the whole reasoning block, then content.
#[must_use]
pub fn prepend_reasoning(reasoning: Option<&str>, content: &str) -> String {
    match reasoning.filter(|r| !r.is_empty()) {
        Some(r) => format!("{THINK_OPEN}{r}{THINK_CLOSE}{content}"),
        None => content.to_string(),
    }
}
