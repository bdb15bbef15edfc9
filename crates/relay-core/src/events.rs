use serde::{Deserialize, Serialize};

/// Events delivered to the protocol boundary for one chat request.
/// Strict ordering contract per session:
///
/// Token* → (ToolInvoked → (ToolResult | Error))* → Token* → Done
///
/// Error can appear at any point; Done is always the final event for an
/// accepted request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "content")]
    Token { text: String },

    #[serde(rename = "tool_invoked")]
    ToolInvoked {
        name: String,
        arguments: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        name: String,
        payload: serde_json::Value,
    },

    #[serde(rename = "error")]
    Error { kind: ErrorKind, message: String },

    #[serde(rename = "done")]
    Done {
        #[serde(default)]
        truncated: bool,
    },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "content",
            Self::ToolInvoked { .. } => "tool_invoked",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}

/// Classification of every failure the protocol can surface.
/// Tool-related kinds are recoverable inside the state machine; the rest
/// end the turn (generator_failure) or are rejected at the gateway
/// (busy, session_not_found).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    ToolInvocationFailed,
    InvalidDirective,
    ToolLoopExceeded,
    GeneratorFailure,
    Busy,
    SessionNotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::ToolInvocationFailed => "tool_invocation_failed",
            Self::InvalidDirective => "invalid_directive",
            Self::ToolLoopExceeded => "tool_loop_exceeded",
            Self::GeneratorFailure => "generator_failure",
            Self::Busy => "busy",
            Self::SessionNotFound => "session_not_found",
        }
    }

    /// Whether the state machine records this failure as a tool-role turn
    /// and resumes generation, rather than ending the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool
                | Self::InvalidArguments
                | Self::ToolInvocationFailed
                | Self::InvalidDirective
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_tags() {
        let evt = ChatEvent::Token { text: "hi".into() };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["text"], "hi");

        let evt = ChatEvent::ToolInvoked {
            name: "weather".into(),
            arguments: serde_json::json!({"city": "Paris"}),
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "tool_invoked");
        assert_eq!(json["name"], "weather");

        let evt = ChatEvent::Done { truncated: false };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["truncated"], false);
    }

    #[test]
    fn error_kind_snake_case() {
        let evt = ChatEvent::Error {
            kind: ErrorKind::ToolInvocationFailed,
            message: "timed out".into(),
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["kind"], "tool_invocation_failed");
    }

    #[test]
    fn terminal_classification() {
        assert!(ChatEvent::Done { truncated: true }.is_terminal());
        assert!(!ChatEvent::Token { text: "x".into() }.is_terminal());
        assert!(!ChatEvent::Error {
            kind: ErrorKind::GeneratorFailure,
            message: "boom".into(),
        }
        .is_terminal());
    }

    #[test]
    fn recoverable_classification() {
        assert!(ErrorKind::UnknownTool.is_recoverable());
        assert!(ErrorKind::InvalidArguments.is_recoverable());
        assert!(ErrorKind::ToolInvocationFailed.is_recoverable());
        assert!(ErrorKind::InvalidDirective.is_recoverable());
        assert!(!ErrorKind::ToolLoopExceeded.is_recoverable());
        assert!(!ErrorKind::GeneratorFailure.is_recoverable());
        assert!(!ErrorKind::Busy.is_recoverable());
        assert!(!ErrorKind::SessionNotFound.is_recoverable());
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let events = vec![
            ChatEvent::Token { text: "hello".into() },
            ChatEvent::ToolInvoked {
                name: "weather".into(),
                arguments: serde_json::json!({"city": "Paris"}),
            },
            ChatEvent::ToolResult {
                name: "weather".into(),
                payload: serde_json::json!({"temp_c": 21}),
            },
            ChatEvent::Error {
                kind: ErrorKind::InvalidDirective,
                message: "bad call block".into(),
            },
            ChatEvent::Done { truncated: true },
        ];

        for evt in &events {
            let json = serde_json::to_string(evt).unwrap();
            let parsed: ChatEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(*evt, parsed, "roundtrip failed for {json}");
        }
    }
}
