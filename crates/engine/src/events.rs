use serde::{Deserialize, Serialize};

use crate::chat::ChatResponse;

/// Events emitted on the streaming path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineEvent {
    /// A fragment of generated text, in order.
    Chunk { text: String },
    /// The request finished; carries the full assembled response.
    Done { response: ChatResponse },
    /// The request failed after a response could no longer be produced.
    Error { error: String },
}
