use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use relay_core::events::ErrorKind;
use relay_core::tools::{ToolDescriptor, ToolOutcome, ToolServer};

use crate::registry::ToolRegistry;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls a named tool through the ToolServer contract and normalizes every
/// failure (unknown name, bad arguments, timeout, provider error) into a
/// recoverable `ToolOutcome`. Holds no session state: independent sessions
/// invoke concurrently through the same instance.
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    server: Arc<dyn ToolServer>,
    call_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, server: Arc<dyn ToolServer>) -> Self {
        Self {
            registry,
            server,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let descriptor = match self.registry.lookup(name) {
            Ok(d) => d,
            Err(e) => {
                return ToolOutcome::Error {
                    kind: ErrorKind::UnknownTool,
                    detail: e.to_string(),
                }
            }
        };

        if let Err(fields) = validate_arguments(descriptor, arguments) {
            return ToolOutcome::Error {
                kind: ErrorKind::InvalidArguments,
                detail: format!("invalid arguments: {}", fields.join(", ")),
            };
        }

        let call = self.server.call(name, arguments);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ToolOutcome::Error {
                kind: ErrorKind::ToolInvocationFailed,
                detail: "invocation cancelled".into(),
            },
            result = tokio::time::timeout(self.call_timeout, call) => match result {
                Err(_) => {
                    warn!(tool = name, timeout_secs = self.call_timeout.as_secs(), "tool call timed out");
                    ToolOutcome::Error {
                        kind: ErrorKind::ToolInvocationFailed,
                        detail: format!("timed out after {}s", self.call_timeout.as_secs()),
                    }
                }
                Ok(Err(e)) => {
                    warn!(tool = name, error = %e, "tool call failed");
                    ToolOutcome::Error {
                        kind: ErrorKind::ToolInvocationFailed,
                        detail: e.to_string(),
                    }
                }
                Ok(Ok(payload)) => ToolOutcome::Success { payload },
            },
        }
    }
}

/// Check arguments against the descriptor's parameter specs. Returns every
/// violating field: missing required, unknown, or wrongly typed.
fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: &serde_json::Value,
) -> Result<(), Vec<String>> {
    let Some(map) = arguments.as_object() else {
        return Err(vec!["arguments must be an object".into()]);
    };

    let mut violations = Vec::new();

    for spec in &descriptor.parameters {
        match map.get(&spec.name) {
            None if spec.required => violations.push(format!("missing required '{}'", spec.name)),
            None => {}
            Some(value) if !spec.kind.matches(value) => violations.push(format!(
                "'{}' must be a {}",
                spec.name,
                spec.kind.as_str()
            )),
            Some(_) => {}
        }
    }

    for key in map.keys() {
        if !descriptor.parameters.iter().any(|p| &p.name == key) {
            violations.push(format!("unknown field '{key}'"));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
