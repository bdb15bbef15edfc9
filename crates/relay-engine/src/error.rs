use relay_core::errors::GeneratorError;

use crate::transcript::TranscriptError;

/// Engine-internal failures. Almost everything the protocol can encounter
/// is recovered inside the state machine and surfaced as events; these are
/// the invariant breaks that are not.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("{0}")]
    Internal(String),
}
