//! FTS5 query preparation.
//!
//! User text must never reach `MATCH` verbatim: bare `AND`/`OR`/`NOT`, `*`,
//! `^`, parentheses and column filters are all interpreted by FTS5. Every
//! token is therefore double-quote-escaped and the tokens OR-joined.

use serde::{Deserialize, Serialize};

/// The named full-text corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsDomain {
    Teams,
    Players,
    News,
}

impl FtsDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            FtsDomain::Teams => "teams",
            FtsDomain::Players => "players",
            FtsDomain::News => "news",
        }
    }
}

/// Maximum tokens forwarded into a single MATCH expression.
const MAX_QUERY_TOKENS: usize = 30;

/// Build a safe FTS5 MATCH expression from raw user text.
///
/// Returns `None` when nothing searchable remains: empty input, or input made
/// entirely of metacharacters. Callers translate `None` into an empty result
/// set rather than an error.
pub fn escape_match_query(raw: &str) -> Option<String> {
    let tokens: Vec<String> = raw
        .split_whitespace()
        .take(MAX_QUERY_TOKENS)
        .filter_map(|word| {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(format!("\"{cleaned}\""))
            }
        })
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}
