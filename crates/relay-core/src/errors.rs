use std::time::Duration;

/// Errors surfaced by a Generator backend. Failures are stream-scoped:
/// they end the current generation, never the process.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("backend error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl GeneratorError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code from the backend.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400..=499 => Self::InvalidRequest(body),
            _ => Self::ServerError { status, body },
        }
    }
}

/// Errors surfaced by the external tool provider. All of them normalize to
/// a recoverable `ToolOutcome::Error` at the invoker; none propagate as
/// panics or fatal results.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ToolServerError {
    #[error("provider failure: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
