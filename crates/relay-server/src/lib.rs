pub mod chat;
pub mod rpc;
pub mod server;
pub mod sessions;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use sessions::{SessionBusy, SessionStore};
