//! Incremental classification of generator output into prose, tool-call
//! directives, and malformed directives.
//!
//! The call grammar is a tagged block with a single JSON object body:
//!
//! ```text
//! <tool_call>{"name": "<tool>", "arguments": { ... }}</tool_call>
//! ```
//!
//! Classification is incremental: a suffix that could still become the
//! opening tag is withheld, never emitted as content, until further input
//! confirms or refutes it. Once the opening tag is confirmed, body text is
//! buffered until the closing tag and never surfaces as content.

use relay_core::tools::{CALL_CLOSE_TAG, CALL_OPEN_TAG};
use serde::Deserialize;

/// Parsed intent of one span of model output.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Content {
        text: String,
    },
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
    Malformed {
        raw: String,
    },
}

/// Cap on buffered directive-body bytes; a body that exceeds it is
/// malformed rather than buffered without bound.
const DEFAULT_MAX_BODY: usize = 16 * 1024;

enum ScanState {
    Prose,
    Body,
}

pub struct DirectiveParser {
    pending: String,
    state: ScanState,
    max_body: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CallBody {
    name: String,
    arguments: serde_json::Value,
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveParser {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            state: ScanState::Prose,
            max_body: DEFAULT_MAX_BODY,
        }
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Feed one increment; returns every directive settled by it, in order.
    /// Adjacent content spans are coalesced.
    pub fn push(&mut self, chunk: &str) -> Vec<Directive> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();

        loop {
            match self.state {
                ScanState::Prose => {
                    let Some(i) = self.pending.find('<') else {
                        if !self.pending.is_empty() {
                            emit_content(&mut out, std::mem::take(&mut self.pending));
                        }
                        break;
                    };

                    let tail = &self.pending[i..];
                    if tail.starts_with(CALL_OPEN_TAG) {
                        if i > 0 {
                            emit_content(&mut out, self.pending[..i].to_string());
                        }
                        self.pending.drain(..i + CALL_OPEN_TAG.len());
                        self.state = ScanState::Body;
                    } else if tail.len() < CALL_OPEN_TAG.len() && CALL_OPEN_TAG.starts_with(tail) {
                        // Could still become the opening tag; withhold.
                        if i > 0 {
                            emit_content(&mut out, self.pending[..i].to_string());
                            self.pending.drain(..i);
                        }
                        break;
                    } else {
                        // Refuted: this '<' does not open a call block.
                        emit_content(&mut out, self.pending[..i + 1].to_string());
                        self.pending.drain(..i + 1);
                    }
                }
                ScanState::Body => {
                    if let Some(j) = self.pending.find(CALL_CLOSE_TAG) {
                        let body: String = self.pending.drain(..j + CALL_CLOSE_TAG.len()).collect();
                        let body = &body[..j];
                        out.push(classify(body));
                        self.state = ScanState::Prose;
                    } else {
                        if self.pending.len() > self.max_body + CALL_CLOSE_TAG.len() {
                            let body = std::mem::take(&mut self.pending);
                            out.push(Directive::Malformed {
                                raw: format!("{CALL_OPEN_TAG}{body}"),
                            });
                            self.state = ScanState::Prose;
                        }
                        break;
                    }
                }
            }
        }

        out
    }

    /// End of generator stream: a withheld tag prefix is refuted and flushes
    /// as content; an open, unterminated block is malformed.
    pub fn finish(&mut self) -> Vec<Directive> {
        let pending = std::mem::take(&mut self.pending);
        match self.state {
            ScanState::Prose => {
                if pending.is_empty() {
                    Vec::new()
                } else {
                    vec![Directive::Content { text: pending }]
                }
            }
            ScanState::Body => {
                self.state = ScanState::Prose;
                vec![Directive::Malformed {
                    raw: format!("{CALL_OPEN_TAG}{pending}"),
                }]
            }
        }
    }
}

fn emit_content(out: &mut Vec<Directive>, text: String) {
    if let Some(Directive::Content { text: last }) = out.last_mut() {
        last.push_str(&text);
    } else {
        out.push(Directive::Content { text });
    }
}

fn classify(body: &str) -> Directive {
    let raw = || format!("{CALL_OPEN_TAG}{body}{CALL_CLOSE_TAG}");
    match serde_json::from_str::<CallBody>(body.trim()) {
        Ok(call) if valid_name(&call.name) && call.arguments.is_object() => Directive::ToolCall {
            name: call.name,
            arguments: call.arguments,
        },
        _ => Directive::Malformed { raw: raw() },
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> Directive {
        Directive::Content { text: text.into() }
    }

    #[test]
    fn plain_prose_flushes_immediately() {
        let mut p = DirectiveParser::new();
        assert_eq!(p.push("Hello there."), vec![content("Hello there.")]);
        assert_eq!(p.push(" More."), vec![content(" More.")]);
        assert!(p.finish().is_empty());
    }

    #[test]
    fn call_in_one_chunk() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"<tool_call>{"name": "weather", "arguments": {"city": "Paris"}}</tool_call>"#);
        assert_eq!(
            out,
            vec![Directive::ToolCall {
                name: "weather".into(),
                arguments: serde_json::json!({"city": "Paris"}),
            }]
        );
    }

    #[test]
    fn prose_before_call_emitted_first() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"Let me check. <tool_call>{"name": "weather", "arguments": {}}</tool_call>"#);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], content("Let me check. "));
        assert!(matches!(&out[1], Directive::ToolCall { name, .. } if name == "weather"));
    }

    #[test]
    fn call_split_across_many_increments() {
        let mut p = DirectiveParser::new();
        let full = r#"<tool_call>{"name": "weather", "arguments": {"city": "Paris"}}</tool_call>"#;
        let mut out = Vec::new();
        // Feed one byte at a time, the worst-case token boundaries.
        for ch in full.chars() {
            out.extend(p.push(&ch.to_string()));
        }
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Directive::ToolCall { name, .. } if name == "weather"));
    }

    #[test]
    fn open_tag_split_mid_tag_is_withheld_not_leaked() {
        let mut p = DirectiveParser::new();
        assert!(p.push("<tool_").is_empty());
        assert!(p.push("call>").is_empty());
        let out = p.push(r#"{"name": "weather", "arguments": {}}</tool_call>"#);
        assert!(matches!(&out[0], Directive::ToolCall { .. }));
    }

    #[test]
    fn refuted_prefix_flushes_as_content() {
        let mut p = DirectiveParser::new();
        assert!(p.push("<tool_").is_empty());
        let out = p.push("box> is a thing");
        assert_eq!(out, vec![content("<tool_box> is a thing")]);
    }

    #[test]
    fn angle_bracket_prose_passes_through() {
        let mut p = DirectiveParser::new();
        let out = p.push("a < b and b > c");
        assert_eq!(out, vec![content("a < b and b > c")]);
    }

    #[test]
    fn double_angle_before_call() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"<<tool_call>{"name": "weather", "arguments": {}}</tool_call>"#);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], content("<"));
        assert!(matches!(&out[1], Directive::ToolCall { .. }));
    }

    #[test]
    fn dangling_prefix_at_finish_is_content() {
        let mut p = DirectiveParser::new();
        // Prose before the withheld prefix flushes immediately.
        assert_eq!(p.push("Sure. <tool_c"), vec![content("Sure. ")]);
        // The withheld "<tool_c" is refuted at end-of-stream.
        assert_eq!(p.finish(), vec![content("<tool_c")]);
    }

    #[test]
    fn unterminated_block_at_finish_is_malformed() {
        let mut p = DirectiveParser::new();
        let _ = p.push(r#"<tool_call>{"name": "weather""#);
        let out = p.finish();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Directive::Malformed { raw } if raw.starts_with(CALL_OPEN_TAG)));
    }

    #[test]
    fn malformed_json_body() {
        let mut p = DirectiveParser::new();
        let out = p.push("<tool_call>not json at all</tool_call>");
        assert!(matches!(&out[0], Directive::Malformed { raw } if raw.contains("not json")));
    }

    #[test]
    fn bad_tool_name_is_malformed() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"<tool_call>{"name": "wea ther!", "arguments": {}}</tool_call>"#);
        assert!(matches!(&out[0], Directive::Malformed { .. }));
    }

    #[test]
    fn non_object_arguments_is_malformed() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"<tool_call>{"name": "weather", "arguments": "Paris"}</tool_call>"#);
        assert!(matches!(&out[0], Directive::Malformed { .. }));
    }

    #[test]
    fn extra_members_are_malformed() {
        let mut p = DirectiveParser::new();
        let out =
            p.push(r#"<tool_call>{"name": "weather", "arguments": {}, "extra": 1}</tool_call>"#);
        assert!(matches!(&out[0], Directive::Malformed { .. }));
    }

    #[test]
    fn prose_resumes_after_call() {
        let mut p = DirectiveParser::new();
        let out = p.push(r#"<tool_call>{"name": "weather", "arguments": {}}</tool_call> done"#);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Directive::ToolCall { .. }));
        assert_eq!(out[1], content(" done"));
    }

    #[test]
    fn oversized_body_is_malformed() {
        let mut p = DirectiveParser::new().with_max_body(64);
        let mut out = p.push("<tool_call>");
        out.extend(p.push(&"x".repeat(200)));
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Directive::Malformed { .. }));
    }

    #[test]
    fn never_tool_call_without_valid_syntax() {
        // Concatenation contains no valid call syntax → never ToolCall.
        let inputs = vec!["tool_call", "<tool", "_call>", "{\"name\": \"weather\"}"];
        let mut p = DirectiveParser::new();
        let mut out = Vec::new();
        for i in inputs {
            out.extend(p.push(i));
        }
        out.extend(p.finish());
        assert!(out
            .iter()
            .all(|d| !matches!(d, Directive::ToolCall { .. })));
    }

    #[test]
    fn body_close_tag_split_across_chunks() {
        let mut p = DirectiveParser::new();
        assert!(p
            .push(r#"<tool_call>{"name": "weather", "arguments": {}}</tool_"#)
            .is_empty());
        let out = p.push("call>");
        assert!(matches!(&out[0], Directive::ToolCall { .. }));
    }
}
