//! The request orchestrator: wires the store, retrieval, persona,
//! conversation, and security subsystems into the per-request pipeline and
//! exposes the single `chat` operation, one-shot or streaming.

mod chat;
mod error;
mod events;
mod prompt;
mod sanitize;
mod vocabulary;

pub use chat::{
    ChatEngine, ChatRequest, ChatResponse, ResponseMetadata, UNVERIFIED_TRUST_LEVEL,
};
pub use error::EngineError;
pub use events::EngineEvent;
pub use prompt::build_system_prompt;
pub use sanitize::sanitize;
pub use vocabulary::enforce_vocabulary;
