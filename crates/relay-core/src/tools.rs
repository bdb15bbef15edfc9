use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ToolServerError;
use crate::events::ErrorKind;

/// Markers bracketing a structured call block in model output. The block
/// body is a single JSON object: `{"name": "...", "arguments": {...}}`.
pub const CALL_OPEN_TAG: &str = "<tool_call>";
pub const CALL_CLOSE_TAG: &str = "</tool_call>";

/// Static description of one callable tool: unique name, human description,
/// and the parameter schema presented to the model and enforced before any
/// call leaves the process. Immutable after registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, kind: ParamKind, required: bool) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            kind,
            required,
        });
        self
    }

    /// JSON-schema-shaped object for presentation to the model.
    pub fn schema_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({"type": p.kind.as_str()}),
            );
            if p.required {
                required.push(serde_json::Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Normalized result of invoking an external tool. Invocation failure is a
/// first-class recoverable result, not an error path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        payload: serde_json::Value,
    },
    Error {
        kind: ErrorKind,
        detail: String,
    },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// The external tool provider contract: stateless between calls, returns a
/// payload or a structured failure within bounded time. Implementations
/// must be shareable across sessions without per-session state.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    async fn call(
        &self,
        tool: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolServerError>;

    async fn healthy(&self) -> bool;
}
