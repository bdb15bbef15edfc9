pub mod directive;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod registry;
pub mod toolserver;
pub mod transcript;

pub use directive::{Directive, DirectiveParser};
pub use invoker::ToolInvoker;
pub use orchestrator::{OrchestratorConfig, Phase, StreamOrchestrator};
pub use registry::{RegistryError, ToolRegistry};
pub use toolserver::{HttpToolServer, MockToolServer};
pub use transcript::Transcript;
