//! The per-session state machine tying generation, directive parsing, and
//! tool invocation into one ordered event stream.
//!
//! States: Idle → Generating → {ToolPending → Generating}* → Finalizing →
//! Idle. Generation and tool invocation are sequential stages: the model
//! never keeps generating while a call is outstanding, and a new call never
//! starts before the previous one resolves. One orchestrator exclusively
//! owns one transcript; nothing here is shared across sessions except the
//! read-only registry and the external capabilities.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use relay_core::context::GenContext;
use relay_core::errors::GeneratorError;
use relay_core::events::{ChatEvent, ErrorKind};
use relay_core::generator::{GenOptions, Generator, TokenEvent};
use relay_core::ids::ToolCallId;
use relay_core::tools::ToolOutcome;
use relay_core::turns::{ToolCallRecord, Turn};

use crate::directive::{Directive, DirectiveParser};
use crate::error::EngineError;
use crate::invoker::ToolInvoker;
use crate::registry::ToolRegistry;
use crate::transcript::Transcript;

const DEFAULT_INCREMENT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_TOOL_ROUNDS: u32 = 4;

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Tool round-trips allowed per user turn; a round is consumed by a
    /// recognized call or a malformed directive (both restart generation).
    pub max_tool_rounds: u32,
    pub options: GenOptions,
    /// Bounded wait for each generator increment.
    pub increment_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            options: GenOptions::default(),
            increment_timeout: DEFAULT_INCREMENT_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    ToolPending,
    Finalizing,
}

/// A directive that suspended the current generation segment.
enum Settled {
    Call {
        name: String,
        arguments: serde_json::Value,
    },
    Malformed {
        raw: String,
    },
}

pub struct StreamOrchestrator {
    generator: Arc<dyn Generator>,
    registry: Arc<ToolRegistry>,
    invoker: ToolInvoker,
    config: OrchestratorConfig,
    phase: Phase,
}

impl StreamOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        registry: Arc<ToolRegistry>,
        invoker: ToolInvoker,
    ) -> Self {
        Self {
            generator,
            registry,
            invoker,
            config: OrchestratorConfig::default(),
            phase: Phase::Idle,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run one user turn to completion. Every accepted turn emits exactly
    /// one terminal `Done`; recoverable failures surface as `Error` events
    /// and generation resumes.
    #[instrument(skip(self, transcript, user_input, events, cancel))]
    pub async fn run(
        &mut self,
        transcript: &mut Transcript,
        user_input: &str,
        tools_enabled: bool,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        transcript.push(Turn::user(user_input));
        let mut rounds_used: u32 = 0;

        loop {
            self.phase = Phase::Generating;
            transcript.begin_assistant()?;

            let context = GenContext {
                turns: transcript.turns().to_vec(),
                tools: if tools_enabled {
                    self.registry.list().to_vec()
                } else {
                    Vec::new()
                },
                tools_enabled,
            };

            let mut stream = match self.generator.generate(&context, &self.config.options).await {
                Ok(s) => s,
                Err(e) => return self.fail_generation(transcript, events, cancel, e).await,
            };

            // With tools disabled the parser step is bypassed entirely.
            let mut parser = tools_enabled.then(DirectiveParser::new);
            let mut settled: Option<Settled> = None;

            'segment: loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return self.finish_truncated(transcript, events, cancel).await;
                    }
                    next = tokio::time::timeout(self.config.increment_timeout, stream.next()) => next,
                };

                let event = match next {
                    Err(_) => {
                        let err = GeneratorError::Timeout(self.config.increment_timeout);
                        return self.fail_generation(transcript, events, cancel, err).await;
                    }
                    Ok(None) => break 'segment,
                    Ok(Some(event)) => event,
                };

                match event {
                    TokenEvent::Delta { text } => match parser.as_mut() {
                        Some(parser) => {
                            for directive in parser.push(&text) {
                                match directive {
                                    Directive::Content { text } => {
                                        if text.is_empty() {
                                            continue;
                                        }
                                        transcript.append_draft(&text)?;
                                        self.emit(events, cancel, ChatEvent::Token { text }).await;
                                    }
                                    Directive::ToolCall { name, arguments } => {
                                        settled = Some(Settled::Call { name, arguments });
                                        break;
                                    }
                                    Directive::Malformed { raw } => {
                                        settled = Some(Settled::Malformed { raw });
                                        break;
                                    }
                                }
                            }
                            if settled.is_some() {
                                // Suspend: the rest of this segment's stream
                                // is abandoned; generation resumes fresh
                                // after the tool round.
                                break 'segment;
                            }
                        }
                        None => {
                            transcript.append_draft(&text)?;
                            self.emit(events, cancel, ChatEvent::Token { text }).await;
                        }
                    },
                    TokenEvent::Done => break 'segment,
                    TokenEvent::Error { error } => {
                        return self.fail_generation(transcript, events, cancel, error).await;
                    }
                }
            }

            if settled.is_none() {
                if let Some(parser) = parser.as_mut() {
                    for directive in parser.finish() {
                        match directive {
                            Directive::Content { text } if !text.is_empty() => {
                                transcript.append_draft(&text)?;
                                self.emit(events, cancel, ChatEvent::Token { text }).await;
                            }
                            Directive::Content { .. } => {}
                            Directive::ToolCall { name, arguments } => {
                                settled = Some(Settled::Call { name, arguments });
                            }
                            Directive::Malformed { raw } => {
                                settled = Some(Settled::Malformed { raw });
                            }
                        }
                    }
                }
            }

            let Some(settled) = settled else {
                self.phase = Phase::Finalizing;
                transcript.finalize_text(false)?;
                self.emit(events, cancel, ChatEvent::Done { truncated: false })
                    .await;
                self.phase = Phase::Idle;
                return Ok(());
            };

            rounds_used += 1;
            if rounds_used > self.config.max_tool_rounds {
                self.emit(
                    events,
                    cancel,
                    ChatEvent::Error {
                        kind: ErrorKind::ToolLoopExceeded,
                        message: format!(
                            "tool round-trip limit of {} exceeded",
                            self.config.max_tool_rounds
                        ),
                    },
                )
                .await;
                // Best-effort partial answer, then close the turn.
                transcript.finalize_text(false)?;
                self.emit(events, cancel, ChatEvent::Done { truncated: false })
                    .await;
                self.phase = Phase::Idle;
                return Ok(());
            }

            match settled {
                Settled::Malformed { raw } => {
                    // A tool-call attempt that failed at the parse stage:
                    // recorded against the transcript so the model can see
                    // its mistake and recover, never surfaced as content.
                    self.emit(
                        events,
                        cancel,
                        ChatEvent::Error {
                            kind: ErrorKind::InvalidDirective,
                            message: "model emitted a malformed tool-call block".into(),
                        },
                    )
                    .await;
                    transcript.finalize_text(false)?;
                    transcript.push(Turn::tool_error(
                        None,
                        ErrorKind::InvalidDirective,
                        format!("unparseable call block: {raw}"),
                    ));
                }
                Settled::Call { name, arguments } => {
                    transcript.finalize_tool_call(ToolCallRecord {
                        id: ToolCallId::new(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    })?;
                    self.emit(
                        events,
                        cancel,
                        ChatEvent::ToolInvoked {
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                    )
                    .await;

                    self.phase = Phase::ToolPending;
                    let outcome = self.invoker.invoke(&name, &arguments, cancel).await;

                    let aborted = cancel.is_cancelled();
                    match outcome {
                        ToolOutcome::Success { payload } => {
                            transcript.push(Turn::tool_success(&name, payload.clone()));
                            if !aborted {
                                self.emit(events, cancel, ChatEvent::ToolResult { name, payload })
                                    .await;
                            }
                        }
                        ToolOutcome::Error { kind, detail } => {
                            transcript.push(Turn::tool_error(Some(name), kind, &detail));
                            if !aborted {
                                self.emit(
                                    events,
                                    cancel,
                                    ChatEvent::Error {
                                        kind,
                                        message: detail,
                                    },
                                )
                                .await;
                            }
                        }
                    }

                    if aborted {
                        self.emit(events, cancel, ChatEvent::Done { truncated: true })
                            .await;
                        self.phase = Phase::Idle;
                        return Ok(());
                    }
                }
            }
            // Back to Generating with the tool turn in context.
        }
    }

    /// Generator failure ends the turn immediately, partial output
    /// preserved. Cancellation surfaced by the backend is truncation.
    async fn fail_generation(
        &mut self,
        transcript: &mut Transcript,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
        error: GeneratorError,
    ) -> Result<(), EngineError> {
        if matches!(error, GeneratorError::Cancelled) {
            return self.finish_truncated(transcript, events, cancel).await;
        }
        warn!(error = %error, kind = error.error_kind(), "generation failed");
        self.emit(
            events,
            cancel,
            ChatEvent::Error {
                kind: ErrorKind::GeneratorFailure,
                message: error.to_string(),
            },
        )
        .await;
        if transcript.has_draft() {
            transcript.finalize_text(false)?;
        }
        self.emit(events, cancel, ChatEvent::Done { truncated: false })
            .await;
        self.phase = Phase::Idle;
        Ok(())
    }

    async fn finish_truncated(
        &mut self,
        transcript: &mut Transcript,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if transcript.has_draft() {
            transcript.finalize_text(true)?;
        }
        self.emit(events, cancel, ChatEvent::Done { truncated: true })
            .await;
        self.phase = Phase::Idle;
        Ok(())
    }

    async fn emit(
        &self,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
        event: ChatEvent,
    ) {
        if events.send(event).await.is_err() {
            // Receiver gone means the client went away; stop doing work.
            warn!("event receiver dropped, cancelling session work");
            cancel.cancel();
        }
    }
}
