//! Durable knowledge base: relational records, full-text corpora, the typed
//! knowledge graph, persona bundles, and the session/observability tables.

mod error;
mod fts;
mod ingest;
mod schema;
mod store;
mod types;

pub use error::StoreError;
pub use fts::{escape_match_query, FtsDomain};
pub use ingest::{NewEdge, NewMatch, NewNode, NewPlayer, NewTeam};
pub use store::{GraphHop, MatchFilter, PlayerRef, Store, TeamRef, TextHit};
pub use types::*;
