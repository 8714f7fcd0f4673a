//! Multi-turn conversation intelligence: entity memory, follow-up
//! resolution, and fact-fingerprint deduplication. Purely in-memory; nothing
//! here survives a process restart.

mod map;
mod resolve;
mod state;

pub use map::{ConversationMap, SharedConversation};
pub use resolve::resolve;
pub use state::{ConversationState, LAST_ENTITY_CAP, RECENT_TURN_CAP};

pub use terrace_retrieval::fingerprint;
