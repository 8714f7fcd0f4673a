use thiserror::Error;

/// The error taxonomy surfaced to callers.
///
/// Mid-turn store and generator failures never land here: they degrade into
/// a normal response with confidence 0 and a metadata flag. A generator
/// outage always has an apology to fall back on, so it has no hard-failure
/// variant at all; a store outage is an `Err` only at construction time,
/// before any request exists to degrade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected by sanitization. No state was mutated.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The store failed while the engine was being built.
    #[error("knowledge store unavailable")]
    StoreUnavailable,
    /// The caller cancelled. Only already-committed security transitions
    /// survive; conversation state is untouched.
    #[error("request cancelled")]
    Cancelled,
}
