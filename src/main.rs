use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use relay_core::generator::GenOptions;
use relay_core::tools::{ParamKind, ToolDescriptor};
use relay_engine::orchestrator::OrchestratorConfig;
use relay_engine::registry::ToolRegistry;
use relay_engine::toolserver::HttpToolServer;
use relay_llm::LlamaGenerator;
use relay_server::ServerConfig;

/// Streaming chat gateway with tool-call orchestration for a locally
/// hosted model.
#[derive(Parser, Debug)]
#[command(name = "relay", version)]
struct Args {
    /// Base URL of the llama.cpp-style completion server.
    #[arg(long, env = "RELAY_GENERATOR_URL", default_value = "http://127.0.0.1:8081")]
    generator_url: String,

    /// JSON-RPC endpoint of the external tool server.
    #[arg(long, env = "RELAY_TOOL_SERVER_URL", default_value = "http://127.0.0.1:8090/rpc")]
    tool_server_url: String,

    /// Port to bind the gateway on.
    #[arg(long, env = "RELAY_PORT", default_value_t = 8000)]
    port: u16,

    /// Tool round-trips allowed per user turn.
    #[arg(long, default_value_t = 4)]
    max_tool_rounds: u32,

    /// Timeout for one tool invocation, in seconds.
    #[arg(long, default_value_t = 30)]
    tool_timeout_secs: u64,

    /// Timeout waiting for one generator increment, in seconds.
    #[arg(long, default_value_t = 120)]
    increment_timeout_secs: u64,

    /// Sampling: maximum tokens per generation segment.
    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting relay gateway");

    // Tool roster is static configuration: registered once here, read-only
    // for the life of the process.
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDescriptor::new(
                "weather",
                "Current weather conditions for a city, from the weather provider",
            )
            .with_param("city", ParamKind::String, true)
            .with_param("units", ParamKind::String, false),
        )
        .context("failed to register weather tool")?;

    let generator = Arc::new(LlamaGenerator::new(&args.generator_url));
    let tool_server = Arc::new(HttpToolServer::new(&args.tool_server_url));

    let config = ServerConfig {
        port: args.port,
        orchestrator: OrchestratorConfig {
            max_tool_rounds: args.max_tool_rounds,
            options: GenOptions {
                max_tokens: args.max_tokens,
                temperature: args.temperature,
                stop: Vec::new(),
            },
            increment_timeout: Duration::from_secs(args.increment_timeout_secs),
        },
        tool_call_timeout: Duration::from_secs(args.tool_timeout_secs),
        ..Default::default()
    };

    let handle = relay_server::start(config, generator, tool_server, Arc::new(registry))
        .await
        .context("failed to start gateway")?;

    tracing::info!(
        port = handle.port,
        generator = %args.generator_url,
        tool_server = %args.tool_server_url,
        "relay gateway ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}
