use crate::tools::ToolDescriptor;
use crate::turns::Turn;

/// The complete context handed to a Generator for one generation segment:
/// the transcript so far plus the tool roster to present to the model.
#[derive(Clone, Debug)]
pub struct GenContext {
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDescriptor>,
    pub tools_enabled: bool,
}

impl GenContext {
    /// Create an empty context (useful for testing).
    pub fn empty() -> Self {
        Self {
            turns: Vec::new(),
            tools: Vec::new(),
            tools_enabled: false,
        }
    }
}
