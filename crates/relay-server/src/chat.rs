//! The `chat` and `chat.abort` RPC methods: request reconciliation,
//! orchestrator spawn, and line-delimited event framing.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use relay_core::events::{ChatEvent, ErrorKind};
use relay_core::ids::SessionId;
use relay_core::turns::Turn;
use relay_engine::invoker::ToolInvoker;
use relay_engine::orchestrator::StreamOrchestrator;
use relay_engine::transcript::Transcript;

use crate::rpc::{RpcRequest, RpcResponse};
use crate::server::AppState;

/// Params of the `chat` method. `messages` is the full transcript the
/// client believes is current; the gateway seeds the session's
/// ConversationState from it.
#[derive(Debug, Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    pub session_id: Option<String>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub tools_enabled: bool,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

pub async fn handle_chat(state: AppState, request: RpcRequest) -> Response {
    let request_id = request.id.clone();
    let params = request.params.unwrap_or_else(|| serde_json::json!({}));
    let params: ChatParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return Json(RpcResponse::invalid_params(request_id, e.to_string())).into_response(),
    };

    let (seed, user_input) = match split_messages(&params.messages) {
        Ok(split) => split,
        Err(e) => return Json(RpcResponse::invalid_params(request_id, e)).into_response(),
    };

    let session_id = params
        .session_id
        .map(SessionId::from_raw)
        .unwrap_or_default();

    // A second request while a generation is in flight is rejected, never
    // queued: the transcript has a single writer.
    let cancel = match state.sessions.begin(&session_id) {
        Ok(cancel) => cancel,
        Err(busy) => {
            info!(session_id = %busy.0, "rejecting concurrent chat request");
            return Json(RpcResponse::busy(request_id, busy.0.as_str())).into_response();
        }
    };

    let (tx, rx) = mpsc::channel::<ChatEvent>(state.config.event_buffer);

    let sessions = Arc::clone(&state.sessions);
    let generator = Arc::clone(&state.generator);
    let registry = Arc::clone(&state.registry);
    let tool_server = Arc::clone(&state.tool_server);
    let orchestrator_config = state.config.orchestrator.clone();
    let tool_call_timeout = state.config.tool_call_timeout;
    let tools_enabled = params.tools_enabled;
    let sid = session_id.clone();

    tokio::spawn(async move {
        let mut transcript = Transcript::from_turns(seed);
        let invoker = ToolInvoker::new(Arc::clone(&registry), tool_server)
            .with_call_timeout(tool_call_timeout);
        let mut orchestrator = StreamOrchestrator::new(generator, registry, invoker)
            .with_config(orchestrator_config);

        let result = orchestrator
            .run(&mut transcript, &user_input, tools_enabled, &tx, &cancel)
            .await;

        if let Err(e) = result {
            error!(session_id = %sid, error = %e, "chat run failed");
            let _ = tx
                .send(ChatEvent::Error {
                    kind: ErrorKind::GeneratorFailure,
                    message: "internal engine error".into(),
                })
                .await;
            let _ = tx.send(ChatEvent::Done { truncated: true }).await;
        }

        sessions.finish(&sid, transcript.snapshot());
    });

    if params.stream {
        stream_response(session_id, request_id, rx)
    } else {
        aggregate_response(session_id, request_id, rx).await
    }
}

pub async fn handle_abort(state: &AppState, request: RpcRequest) -> RpcResponse {
    let params = request.params.unwrap_or_else(|| serde_json::json!({}));
    let session_id = match crate::rpc::require_str(&params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(request.id, e),
    };

    if !state.sessions.known(&session_id) {
        return RpcResponse::session_not_found(request.id, session_id.as_str());
    }

    let aborted = state.sessions.abort(&session_id);
    RpcResponse::success(request.id, serde_json::json!({"aborted": aborted}))
}

/// Split the client transcript into seed turns plus the new user input.
/// The final message must be the user turn this request is asking about.
fn split_messages(messages: &[WireMessage]) -> Result<(Vec<Turn>, String), String> {
    let Some((last, history)) = messages.split_last() else {
        return Err("messages must not be empty".into());
    };
    if last.role != "user" {
        return Err(format!(
            "last message must have role 'user', got '{}'",
            last.role
        ));
    }

    let mut seed = Vec::with_capacity(history.len());
    for msg in history {
        let turn = match msg.role.as_str() {
            "system" => Turn::system(&msg.content),
            "user" => Turn::user(&msg.content),
            "assistant" => Turn::assistant(&msg.content),
            other => return Err(format!("unknown role '{other}'")),
        };
        seed.push(turn);
    }
    Ok((seed, last.content.clone()))
}

/// One framed NDJSON line, flushed as produced.
pub(crate) fn frame_event(event: &ChatEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","kind":"generator_failure","message":"event serialization failed"}"#
            .to_string()
    });
    line.push('\n');
    line
}

fn frame_json(value: &serde_json::Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

fn stream_response(
    session_id: SessionId,
    request_id: Option<serde_json::Value>,
    rx: mpsc::Receiver<ChatEvent>,
) -> Response {
    let preamble = frame_json(&serde_json::json!({
        "type": "start",
        "session_id": session_id.as_str(),
        "id": request_id,
    }));

    let lines = futures::stream::once(std::future::ready(preamble))
        .chain(ReceiverStream::new(rx).map(|evt| frame_event(&evt)))
        .map(Ok::<String, Infallible>);

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines))
    {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "failed to build streaming response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Fold the event stream into a single JSON-RPC result for `stream: false`
/// callers: the concatenated content plus the truncation flag.
async fn aggregate_response(
    session_id: SessionId,
    request_id: Option<serde_json::Value>,
    mut rx: mpsc::Receiver<ChatEvent>,
) -> Response {
    let mut content = String::new();
    let mut truncated = false;

    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::Token { text } => content.push_str(&text),
            ChatEvent::Done { truncated: t } => truncated = t,
            _ => {}
        }
    }

    Json(RpcResponse::success(
        request_id,
        serde_json::json!({
            "session_id": session_id.as_str(),
            "content": content,
            "truncated": truncated,
        }),
    ))
    .into_response()
}
