use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::Stream;

use relay_core::context::GenContext;
use relay_core::errors::GeneratorError;
use relay_core::generator::{GenOptions, Generator, TokenEvent};

/// Pre-programmed generation scripts for deterministic testing without a
/// model backend.
#[derive(Clone)]
pub enum MockScript {
    /// Yield a sequence of TokenEvents.
    Stream(Vec<TokenEvent>),
    /// Return an error from the generate() call itself.
    Error(GeneratorError),
    /// Wait a duration, then yield the inner script.
    Delay(Duration, Box<MockScript>),
}

impl MockScript {
    /// Convenience: a whole reply delivered as a single delta.
    pub fn text(text: &str) -> Self {
        Self::chunks(vec![text])
    }

    /// Convenience: a reply delivered as the given deltas, then Done.
    pub fn chunks(chunks: Vec<&str>) -> Self {
        let mut events: Vec<TokenEvent> = chunks
            .into_iter()
            .map(|c| TokenEvent::Delta { text: c.into() })
            .collect();
        events.push(TokenEvent::Done);
        Self::Stream(events)
    }

    /// Convenience: some deltas, then a mid-stream error.
    pub fn interrupted(chunks: Vec<&str>, error: GeneratorError) -> Self {
        let mut events: Vec<TokenEvent> = chunks
            .into_iter()
            .map(|c| TokenEvent::Delta { text: c.into() })
            .collect();
        events.push(TokenEvent::Error { error });
        Self::Stream(events)
    }

    /// Convenience: wrap any script with a delay.
    pub fn delayed(delay: Duration, inner: MockScript) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock generator that plays back scripts in call order.
pub struct MockGenerator {
    scripts: Vec<MockScript>,
    call_count: AtomicUsize,
    healthy: bool,
}

impl MockGenerator {
    pub fn new(scripts: Vec<MockScript>) -> Self {
        Self {
            scripts,
            call_count: AtomicUsize::new(0),
            healthy: true,
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        _context: &GenContext,
        _options: &GenOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = TokenEvent> + Send>>, GeneratorError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let mut script = self.scripts.get(idx).ok_or_else(|| {
            GeneratorError::InvalidRequest(format!("MockGenerator: no script for call {idx}"))
        })?;

        loop {
            match script {
                MockScript::Stream(events) => {
                    return Ok(Box::pin(stream::iter(events.clone())));
                }
                MockScript::Error(e) => return Err(e.clone()),
                MockScript::Delay(duration, inner) => {
                    tokio::time::sleep(*duration).await;
                    script = inner;
                }
            }
        }
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}
