//! Contextual trigger detection over the raw query.

use chrono::{Datelike, NaiveDate};
use terrace_store::{LegendSummary, MomentSummary, PersonaIdentity, RivalSummary};

const SQUAD_KEYWORDS: [&str; 6] = ["squad", "injuries", "fitness", "fit", "out", "available"];

/// Cue words that turn a legend mention into a comparison.
const LEGEND_CUES: [&str; 5] = ["next", "like", "vs", "reminds", "better"];

/// How many tokens before the legend name a cue may sit.
const LEGEND_CUE_WINDOW: usize = 4;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Minimum length for a name fragment to count as a mention on its own, so
/// "Hotspur" triggers but a stray "FC" never does.
const NAME_WORD_MIN: usize = 4;

/// Position of a name mention in the query: the full phrase when present,
/// otherwise any sufficiently distinctive constituent word ("Tottenham" for
/// "Tottenham Hotspur").
fn contains_name(query_words: &[String], name: &str) -> Option<usize> {
    let name_words = words(name);
    if name_words.is_empty() {
        return None;
    }
    if let Some(position) = query_words
        .windows(name_words.len())
        .position(|window| window == name_words.as_slice())
    {
        return Some(position);
    }
    query_words.iter().position(|w| {
        name_words
            .iter()
            .any(|n| n.len() >= NAME_WORD_MIN && n == w)
    })
}

/// Rival team mentioned in the query; the highest-intensity rival wins ties.
pub fn rival_mention<'a>(query: &str, persona: &'a PersonaIdentity) -> Option<&'a RivalSummary> {
    let query_words = words(query);
    persona
        .rivals
        .iter()
        .filter(|rival| contains_name(&query_words, &rival.name).is_some())
        .max_by_key(|rival| rival.intensity)
}

pub fn squad_query(query: &str) -> bool {
    let query_words = words(query);
    query_words
        .iter()
        .any(|w| SQUAD_KEYWORDS.contains(&w.as_str()))
}

/// A legend name preceded by a comparison cue within a four-token window.
pub fn legend_comparison<'a>(
    query: &str,
    persona: &'a PersonaIdentity,
) -> Option<&'a LegendSummary> {
    let query_words = words(query);
    persona.legends.iter().find(|legend| {
        let Some(position) = contains_name(&query_words, &legend.name) else {
            return false;
        };
        let window_start = position.saturating_sub(LEGEND_CUE_WINDOW);
        query_words[window_start..position]
            .iter()
            .any(|w| LEGEND_CUES.contains(&w.as_str()))
    })
}

/// A stored moment whose month and day match today's date.
pub fn anniversary<'a>(persona: &'a PersonaIdentity, today: NaiveDate) -> Option<&'a MomentSummary> {
    persona.moments.iter().find(|moment| {
        moment
            .date
            .is_some_and(|d| d.month() == today.month() && d.day() == today.day())
    })
}
