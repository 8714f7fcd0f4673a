//! Persona state: mood from form, contextual triggers, and the compact
//! evidence blocks they inject.

mod enrich;
mod mood;
mod triggers;

pub use enrich::{Enricher, Enrichment, EnrichmentBlock, EnrichmentKind};
pub use mood::{derive_mood, MoodSnapshot, MoodTag};
pub use triggers::{anniversary, legend_comparison, rival_mention, squad_query};
