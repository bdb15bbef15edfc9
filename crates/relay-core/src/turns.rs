use serde::{Deserialize, Serialize};

use crate::events::ErrorKind;
use crate::ids::ToolCallId;

/// One role-tagged entry in a conversation transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Turn {
    #[serde(rename = "system")]
    System(SystemTurn),
    #[serde(rename = "user")]
    User(UserTurn),
    #[serde(rename = "assistant")]
    Assistant(AssistantTurn),
    #[serde(rename = "tool")]
    Tool(ToolTurn),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemTurn {
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserTurn {
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantTurn {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolTurn {
    pub result: ToolResultRecord,
}

/// An assistant turn's request to invoke a tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of a tool round, as recorded in the transcript. The error form
/// carries no name when the directive never parsed far enough to yield one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResultRecord {
    Success {
        name: String,
        payload: serde_json::Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        kind: ErrorKind,
        detail: String,
    },
}

// --- Convenience constructors ---

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Turn::System(SystemTurn {
            content: content.into(),
        })
    }

    pub fn user(content: impl Into<String>) -> Self {
        Turn::User(UserTurn {
            content: content.into(),
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn::Assistant(AssistantTurn {
            content: content.into(),
            tool_call: None,
            truncated: false,
        })
    }

    pub fn tool_success(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Turn::Tool(ToolTurn {
            result: ToolResultRecord::Success {
                name: name.into(),
                payload,
            },
        })
    }

    pub fn tool_error(name: Option<String>, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Turn::Tool(ToolTurn {
            result: ToolResultRecord::Error {
                name,
                kind,
                detail: detail.into(),
            },
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Turn::System(_) => Role::System,
            Turn::User(_) => Role::User,
            Turn::Assistant(_) => Role::Assistant,
            Turn::Tool(_) => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Turn::System(t) => &t.content,
            Turn::User(t) => &t.content,
            Turn::Assistant(t) => &t.content,
            Turn::Tool(_) => "",
        }
    }
}

impl AssistantTurn {
    pub fn has_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }
}
