//! ToolServer implementations: the JSON-RPC HTTP client used in production
//! and a scripted mock for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use relay_core::errors::ToolServerError;
use relay_core::tools::ToolServer;

/// JSON-RPC client for an external tool provider exposing `tools/call` and
/// `ping`. The provider is stateless between calls; one client instance is
/// shared across all sessions.
pub struct HttpToolServer {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcReplyError>,
}

#[derive(Debug, Deserialize)]
struct RpcReplyError {
    #[serde(default)]
    message: String,
}

impl HttpToolServer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn rpc_body(&self, method: &str, params: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    async fn post(&self, body: serde_json::Value) -> Result<RpcReply, ToolServerError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolServerError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolServerError::Provider(format!(
                "tool server returned {status}"
            )));
        }

        resp.json::<RpcReply>()
            .await
            .map_err(|e| ToolServerError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl ToolServer for HttpToolServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn call(
        &self,
        tool: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolServerError> {
        let body = self.rpc_body(
            "tools/call",
            serde_json::json!({"name": tool, "arguments": arguments}),
        );
        let reply = self.post(body).await?;

        if let Some(err) = reply.error {
            return Err(ToolServerError::Provider(err.message));
        }
        reply
            .result
            .ok_or_else(|| ToolServerError::MalformedResponse("reply carried no result".into()))
    }

    async fn healthy(&self) -> bool {
        let body = self.rpc_body("ping", serde_json::json!({}));
        matches!(self.post(body).await, Ok(reply) if reply.error.is_none())
    }
}

/// Scripted call outcome for the mock server.
#[derive(Clone)]
enum Scripted {
    Payload(serde_json::Value),
    Failure(String),
    Delayed(Duration, serde_json::Value),
}

/// Deterministic in-process ToolServer for tests.
pub struct MockToolServer {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Arc<AtomicUsize>,
    healthy: bool,
}

impl Default for MockToolServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolServer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            healthy: true,
        }
    }

    pub fn with_payload(self, tool: &str, payload: serde_json::Value) -> Self {
        self.scripts
            .lock()
            .insert(tool.to_string(), Scripted::Payload(payload));
        self
    }

    pub fn with_failure(self, tool: &str, detail: &str) -> Self {
        self.scripts
            .lock()
            .insert(tool.to_string(), Scripted::Failure(detail.to_string()));
        self
    }

    pub fn with_delayed_payload(
        self,
        tool: &str,
        delay: Duration,
        payload: serde_json::Value,
    ) -> Self {
        self.scripts
            .lock()
            .insert(tool.to_string(), Scripted::Delayed(delay, payload));
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Shared counter of calls that actually reached the server.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ToolServer for MockToolServer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn call(
        &self,
        tool: &str,
        _arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolServerError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let script = self.scripts.lock().get(tool).cloned();
        match script {
            Some(Scripted::Payload(payload)) => Ok(payload),
            Some(Scripted::Failure(detail)) => Err(ToolServerError::Provider(detail)),
            Some(Scripted::Delayed(delay, payload)) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            None => Err(ToolServerError::Provider(format!(
                "no script for tool '{tool}'"
            ))),
        }
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}
