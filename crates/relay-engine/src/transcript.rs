use relay_core::turns::{AssistantTurn, Turn};

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("an assistant turn is already in progress")]
    DraftAlreadyOpen,
    #[error("no assistant turn in progress")]
    NoDraft,
}

/// The ordered transcript for one session: finalized turns plus at most one
/// in-progress assistant turn. Owned exclusively by the session's
/// orchestrator; everyone else sees snapshots.
///
/// A draft transitions to a finalized turn exactly once: finalization
/// consumes it, and a finalized turn is never reopened.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    draft: Option<DraftTurn>,
}

#[derive(Clone, Debug, Default)]
struct DraftTurn {
    content: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns, draft: None }
    }

    /// Append an already-finalized turn (user, tool, system).
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn begin_assistant(&mut self) -> Result<(), TranscriptError> {
        if self.draft.is_some() {
            return Err(TranscriptError::DraftAlreadyOpen);
        }
        self.draft = Some(DraftTurn::default());
        Ok(())
    }

    pub fn append_draft(&mut self, text: &str) -> Result<(), TranscriptError> {
        let draft = self.draft.as_mut().ok_or(TranscriptError::NoDraft)?;
        draft.content.push_str(text);
        Ok(())
    }

    pub fn has_draft(&self) -> bool {
        self.draft.is_some()
    }

    pub fn draft_content(&self) -> Option<&str> {
        self.draft.as_ref().map(|d| d.content.as_str())
    }

    /// Close the draft as a plain assistant turn.
    pub fn finalize_text(&mut self, truncated: bool) -> Result<(), TranscriptError> {
        let draft = self.draft.take().ok_or(TranscriptError::NoDraft)?;
        self.turns.push(Turn::Assistant(AssistantTurn {
            content: draft.content,
            tool_call: None,
            truncated,
        }));
        Ok(())
    }

    /// Close the draft as a tool-call record; any prose accumulated before
    /// the call is kept as the turn's content.
    pub fn finalize_tool_call(
        &mut self,
        call: relay_core::turns::ToolCallRecord,
    ) -> Result<(), TranscriptError> {
        let draft = self.draft.take().ok_or(TranscriptError::NoDraft)?;
        self.turns.push(Turn::Assistant(AssistantTurn {
            content: draft.content,
            tool_call: Some(call),
            truncated: false,
        }));
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// A copy of the finalized turns, for gateway-side reads.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }
}
