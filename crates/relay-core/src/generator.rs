use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::context::GenContext;
use crate::errors::GeneratorError;

/// Sampling options for one generation segment.
#[derive(Clone, Debug)]
pub struct GenOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub stop: Vec<String>,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            stop: Vec::new(),
        }
    }
}

/// One item of a generation stream. The stream is lazy, finite, and
/// non-restartable: after `Done` or `Error` no further items follow.
#[derive(Clone, Debug)]
pub enum TokenEvent {
    Delta { text: String },
    Done,
    Error { error: GeneratorError },
}

impl TokenEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// The model inference backend contract. Given a context and sampling
/// options it produces a stream of text increments; mid-stream failure
/// surfaces as a stream-ending `TokenEvent::Error`.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        context: &GenContext,
        options: &GenOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = TokenEvent> + Send>>, GeneratorError>;

    /// Synchronous-ish reachability probe for the health endpoint; must not
    /// go through the streaming path.
    async fn healthy(&self) -> bool;
}
