//! Streaming client for a llama.cpp-style completion server.
//!
//! Speaks the `/completion` endpoint with `stream: true`: the backend
//! answers with SSE `data:` lines, each carrying a JSON chunk of the form
//! `{"content": "...", "stop": bool}`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use relay_core::context::GenContext;
use relay_core::errors::GeneratorError;
use relay_core::generator::{GenOptions, Generator, TokenEvent};

use crate::prompt;
use crate::sse::SseLineBuffer;

pub struct LlamaGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

impl LlamaGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn completion_url(&self) -> String {
        format!("{}/completion", self.base_url)
    }

    fn build_request(prompt: &str, options: &GenOptions) -> serde_json::Value {
        serde_json::json!({
            "prompt": prompt,
            "stream": true,
            "n_predict": options.max_tokens,
            "temperature": options.temperature,
            "stop": options.stop,
            "cache_prompt": true,
        })
    }
}

#[async_trait]
impl Generator for LlamaGenerator {
    fn name(&self) -> &str {
        "llama"
    }

    async fn generate(
        &self,
        context: &GenContext,
        options: &GenOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = TokenEvent> + Send>>, GeneratorError> {
        let rendered = prompt::build_prompt(context);
        let mut options = options.clone();
        if options.stop.is_empty() {
            options.stop = prompt::stop_sequences();
        }
        let body = Self::build_request(&rendered, &options);

        let resp = self
            .client
            .post(self.completion_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeneratorError::from_status(status.as_u16(), body));
        }

        let (tx, rx) = mpsc::channel::<TokenEvent>(64);
        let mut bytes = resp.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(TokenEvent::Error {
                                error: GeneratorError::StreamInterrupted(e.to_string()),
                            })
                            .await;
                        return;
                    }
                };

                for data in lines.push(&chunk) {
                    let parsed = match serde_json::from_str::<CompletionChunk>(&data) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "unparseable completion chunk");
                            let _ = tx
                                .send(TokenEvent::Error {
                                    error: GeneratorError::StreamInterrupted(format!(
                                        "unparseable chunk: {e}"
                                    )),
                                })
                                .await;
                            return;
                        }
                    };

                    if !parsed.content.is_empty()
                        && tx
                            .send(TokenEvent::Delta {
                                text: parsed.content,
                            })
                            .await
                            .is_err()
                    {
                        return;
                    }
                    if parsed.stop {
                        let _ = tx.send(TokenEvent::Done).await;
                        return;
                    }
                }
            }
            // Backend closed the stream without a stop marker.
            let _ = tx.send(TokenEvent::Done).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn healthy(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
