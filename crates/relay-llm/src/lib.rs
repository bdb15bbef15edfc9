pub mod llama;
pub mod prompt;
pub mod sse;

pub mod mock;

pub use llama::LlamaGenerator;
pub use mock::{MockGenerator, MockScript};
