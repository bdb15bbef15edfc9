//! Chat-template construction for Gemma-style instruction models.
//!
//! Turns the transcript into the `<start_of_turn>` framed prompt the
//! backend expects, with a system preamble that carries the tool roster and
//! the exact call-block grammar the engine recognizes.

use relay_core::context::GenContext;
use relay_core::tools::{ToolDescriptor, CALL_CLOSE_TAG, CALL_OPEN_TAG};
use relay_core::turns::Turn;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a local chat service. Be concise and accurate.";

/// Stop sequences that end a model turn under this template.
pub fn stop_sequences() -> Vec<String> {
    vec!["<end_of_turn>".into(), "<start_of_turn>".into()]
}

/// Render the full prompt for one generation segment.
pub fn build_prompt(ctx: &GenContext) -> String {
    let mut out = String::new();
    out.push_str("<bos><start_of_turn>system\n");
    out.push_str(&system_preamble(ctx));
    out.push_str("<end_of_turn>\n");

    for turn in &ctx.turns {
        match turn {
            // Session-level system turns are folded into the preamble above.
            Turn::System(_) => {}
            Turn::User(t) => push_turn(&mut out, "user", &t.content),
            Turn::Assistant(t) => {
                let mut body = t.content.clone();
                if let Some(call) = &t.tool_call {
                    // Re-render the model's own call block so it sees what it
                    // asked for when generation resumes after the tool round.
                    let block = serde_json::json!({
                        "name": call.name,
                        "arguments": call.arguments,
                    });
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    body.push_str(CALL_OPEN_TAG);
                    body.push_str(&block.to_string());
                    body.push_str(CALL_CLOSE_TAG);
                }
                push_turn(&mut out, "model", &body);
            }
            Turn::Tool(t) => {
                let body = serde_json::to_string(&t.result)
                    .unwrap_or_else(|_| r#"{"status":"error"}"#.into());
                push_turn(&mut out, "tool", &body);
            }
        }
    }

    out.push_str("<start_of_turn>model\n");
    out
}

fn push_turn(out: &mut String, role: &str, content: &str) {
    out.push_str("<start_of_turn>");
    out.push_str(role);
    out.push('\n');
    out.push_str(content);
    out.push_str("<end_of_turn>\n");
}

fn system_preamble(ctx: &GenContext) -> String {
    let mut out = String::new();

    // A leading system turn from the transcript overrides the default.
    let base = ctx
        .turns
        .iter()
        .find_map(|t| match t {
            Turn::System(s) => Some(s.content.as_str()),
            _ => None,
        })
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    out.push_str(base);

    if ctx.tools_enabled && !ctx.tools.is_empty() {
        out.push_str("\n\nYou can call external tools. To call one, emit exactly:\n");
        out.push_str(CALL_OPEN_TAG);
        out.push_str(r#"{"name": "<tool>", "arguments": {...}}"#);
        out.push_str(CALL_CLOSE_TAG);
        out.push_str(
            "\nEmit nothing else inside the block. After the tool turn arrives, \
             answer the user in plain language.\n\nAvailable tools:\n",
        );
        for tool in &ctx.tools {
            out.push_str(&tool_line(tool));
        }
    } else {
        out.push_str("\n\nTools are disabled. Answer directly without calling functions.");
    }

    out
}

fn tool_line(tool: &ToolDescriptor) -> String {
    format!(
        "- {}: {} (parameters: {})\n",
        tool.name,
        tool.description,
        tool.schema_json()
    )
}
