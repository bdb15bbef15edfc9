use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use relay_core::generator::Generator;
use relay_core::tools::ToolServer;
use relay_engine::orchestrator::OrchestratorConfig;
use relay_engine::registry::ToolRegistry;

use crate::chat;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::sessions::SessionStore;

/// Gateway configuration.
pub struct ServerConfig {
    pub port: u16,
    /// Capacity of the per-request event channel.
    pub event_buffer: usize,
    pub orchestrator: OrchestratorConfig,
    pub tool_call_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            event_buffer: 256,
            orchestrator: OrchestratorConfig::default(),
            tool_call_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared application state passed to Axum handlers. Everything here is
/// either read-only after startup (registry, config) or internally
/// synchronized (sessions); live transcripts are never reachable from it.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub generator: Arc<dyn Generator>,
    pub tool_server: Arc<dyn ToolServer>,
    pub registry: Arc<ToolRegistry>,
    pub config: Arc<ServerConfig>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(
    config: ServerConfig,
    generator: Arc<dyn Generator>,
    tool_server: Arc<dyn ToolServer>,
    registry: Arc<ToolRegistry>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        sessions: Arc::new(SessionStore::new()),
        generator,
        tool_server,
        registry,
        config: Arc::new(config),
    };

    let port = state.config.port;
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), "relay gateway started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

/// Handle returned by `start()`; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

async fn rpc_handler(State(state): State<AppState>, body: String) -> Response {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return Json(RpcResponse::parse_error()).into_response(),
    };

    match request.method.as_str() {
        "chat" => chat::handle_chat(state, request).await,
        "chat.abort" => Json(chat::handle_abort(&state, request).await).into_response(),
        "system.ping" | "health" => {
            let (_, payload) = health_payload(&state).await;
            Json(RpcResponse::success(request.id, payload)).into_response()
        }
        _ => Json(RpcResponse::method_not_found(request.id, &request.method)).into_response(),
    }
}

/// Synchronous readiness probe: reports whether the Generator and the
/// ToolServer are reachable, without touching the streaming machinery.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (healthy, payload) = health_payload(&state).await;
    let status = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(payload))
}

async fn health_payload(state: &AppState) -> (bool, serde_json::Value) {
    let (generator_ok, tool_server_ok) =
        tokio::join!(state.generator.healthy(), state.tool_server.healthy());
    let healthy = generator_ok && tool_server_ok;
    let payload = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "relay-gateway",
        "details": {
            "generator_status": if generator_ok { "ok" } else { "unreachable" },
            "tool_server_status": if tool_server_ok { "ok" } else { "unreachable" },
            "active_sessions": state.sessions.active_count(),
        },
    });
    (healthy, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::tools::{ParamKind, ToolDescriptor};
    use relay_engine::toolserver::MockToolServer;
    use relay_llm::mock::{MockGenerator, MockScript};

    const WEATHER_CALL: &str =
        r#"<tool_call>{"name": "weather", "arguments": {"city": "Paris"}}</tool_call>"#;

    fn weather_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("weather", "Current weather for a city").with_param(
                    "city",
                    ParamKind::String,
                    true,
                ),
            )
            .unwrap();
        Arc::new(registry)
    }

    async fn start_test_server(
        scripts: Vec<MockScript>,
        tool_server: MockToolServer,
    ) -> ServerHandle {
        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };
        start(
            config,
            Arc::new(MockGenerator::new(scripts)),
            Arc::new(tool_server),
            weather_registry(),
        )
        .await
        .unwrap()
    }

    async fn rpc_call(port: u16, body: serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/rpc"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    fn chat_body(session_id: &str, text: &str, tools_enabled: bool, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "method": "chat",
            "params": {
                "session_id": session_id,
                "messages": [{"role": "user", "content": text}],
                "tools_enabled": tools_enabled,
                "stream": stream,
            },
            "id": 1,
        })
    }

    async fn stream_lines(resp: reqwest::Response) -> Vec<serde_json::Value> {
        let text = resp.text().await.unwrap();
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let handle = start_test_server(vec![], MockToolServer::new()).await;
        let resp = reqwest::get(format!("http://127.0.0.1:{}/health", handle.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["details"]["generator_status"], "ok");
        assert_eq!(body["details"]["tool_server_status"], "ok");
    }

    #[tokio::test]
    async fn health_degrades_when_tool_server_unreachable() {
        let handle = start_test_server(vec![], MockToolServer::new().unhealthy()).await;
        let resp = reqwest::get(format!("http://127.0.0.1:{}/health", handle.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["details"]["tool_server_status"], "unreachable");
    }

    #[tokio::test]
    async fn chat_without_tools_streams_content_only() {
        let handle = start_test_server(
            vec![MockScript::chunks(vec!["Hello", " there!"])],
            MockToolServer::new(),
        )
        .await;

        let resp = rpc_call(handle.port, chat_body("sess_plain", "Hi", false, true)).await;
        assert_eq!(resp.status(), 200);
        let lines = stream_lines(resp).await;

        assert_eq!(lines[0]["type"], "start");
        assert_eq!(lines[0]["session_id"], "sess_plain");
        let types: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["content", "content", "done"]);
        assert!(types.iter().all(|t| *t != "tool_invoked"));
    }

    #[tokio::test]
    async fn chat_with_weather_tool_round_trip() {
        let handle = start_test_server(
            vec![
                MockScript::chunks(vec!["Checking. ", WEATHER_CALL]),
                MockScript::text("It is 21C and clear in Paris."),
            ],
            MockToolServer::new()
                .with_payload("weather", serde_json::json!({"temp_c": 21, "sky": "clear"})),
        )
        .await;

        let resp = rpc_call(
            handle.port,
            chat_body("sess_weather", "Weather in Paris?", true, true),
        )
        .await;
        let lines = stream_lines(resp).await;

        let types: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec!["content", "tool_invoked", "tool_result", "content", "done"]
        );

        let invoked = &lines[2];
        assert_eq!(invoked["name"], "weather");
        assert_eq!(invoked["arguments"]["city"], "Paris");
        let result = &lines[3];
        assert_eq!(result["payload"]["temp_c"], 21);
    }

    #[tokio::test]
    async fn second_request_on_generating_session_is_busy() {
        let handle = start_test_server(
            vec![MockScript::delayed(
                Duration::from_millis(500),
                MockScript::text("slow answer"),
            )],
            MockToolServer::new(),
        )
        .await;
        let port = handle.port;

        let first = tokio::spawn(async move {
            rpc_call(port, chat_body("sess_busy", "first", false, true)).await
        });
        // Let the first request claim the session.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = rpc_call(port, chat_body("sess_busy", "second", false, true)).await;
        let body: serde_json::Value = second.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "BUSY");

        // The first request still completes normally.
        let lines = stream_lines(first.await.unwrap()).await;
        assert_eq!(lines.last().unwrap()["type"], "done");
    }

    #[tokio::test]
    async fn non_streaming_chat_aggregates_content() {
        let handle = start_test_server(
            vec![MockScript::chunks(vec!["Hello", " world"])],
            MockToolServer::new(),
        )
        .await;

        let resp = rpc_call(handle.port, chat_body("sess_sync", "Hi", false, false)).await;
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["content"], "Hello world");
        assert_eq!(body["result"]["truncated"], false);
        assert_eq!(body["result"]["session_id"], "sess_sync");
    }

    #[tokio::test]
    async fn abort_on_unknown_session_is_rejected() {
        let handle = start_test_server(vec![], MockToolServer::new()).await;
        let resp = rpc_call(
            handle.port,
            serde_json::json!({
                "method": "chat.abort",
                "params": {"session_id": "sess_never_seen"},
                "id": 2,
            }),
        )
        .await;
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let handle = start_test_server(vec![], MockToolServer::new()).await;
        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/rpc", handle.port))
            .body("this is not json")
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn unknown_method_rejected() {
        let handle = start_test_server(vec![], MockToolServer::new()).await;
        let resp = rpc_call(
            handle.port,
            serde_json::json!({"method": "chat.teleport", "id": 3}),
        )
        .await;
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn rpc_health_method_answers() {
        let handle = start_test_server(vec![], MockToolServer::new()).await;
        let resp = rpc_call(
            handle.port,
            serde_json::json!({"method": "system.ping", "id": 4}),
        )
        .await;
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["status"], "healthy");
    }
}
