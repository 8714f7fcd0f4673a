//! Query parsing: entity extraction, intent classification, date handling.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use terrace_store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Team,
    Player,
    Legend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    /// Canonical name from the dictionary, not the matched alias.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SquadFitness,
    Transfers,
    LegendComparison,
    Standings,
    Scores,
    Fixtures,
    Historical,
    PersonaGeneral,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::SquadFitness => "squad_fitness",
            Intent::Transfers => "transfers",
            Intent::LegendComparison => "legend_comparison",
            Intent::Standings => "standings",
            Intent::Scores => "scores",
            Intent::Fixtures => "fixtures",
            Intent::Historical => "historical",
            Intent::PersonaGeneral => "persona_general",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub entities: Vec<ExtractedEntity>,
    pub intent: Intent,
    pub date: Option<NaiveDate>,
    /// "latest"/"recent" modifier: ignore any extracted date and scan the
    /// whole list instead.
    pub whole_list: bool,
}

// ── Entity dictionary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DictEntry {
    alias_lower: String,
    kind: EntityKind,
    canonical: String,
}

/// Known names for entity recognition. Built once from the store; longest
/// alias wins when matches overlap.
#[derive(Debug, Clone, Default)]
pub struct EntityDictionary {
    entries: Vec<DictEntry>,
}

impl EntityDictionary {
    pub fn from_store(store: &Store) -> Result<Self, StoreError> {
        let mut dict = EntityDictionary::default();
        for team in store.list_teams()? {
            dict.add(EntityKind::Team, &team.name, &team.name);
            dict.add(EntityKind::Team, &team.short_name, &team.name);
            for alias in &team.aliases {
                dict.add(EntityKind::Team, alias, &team.name);
            }
        }
        for player in store.list_players()? {
            dict.add(EntityKind::Player, &player.name, &player.name);
        }
        for legend in store.list_legend_names()? {
            dict.add(EntityKind::Legend, &legend, &legend);
        }
        dict.seal();
        Ok(dict)
    }

    pub fn add(&mut self, kind: EntityKind, alias: &str, canonical: &str) {
        let alias_lower = alias.trim().to_lowercase();
        if alias_lower.is_empty() {
            return;
        }
        self.entries.push(DictEntry {
            alias_lower,
            kind,
            canonical: canonical.to_string(),
        });
    }

    /// Sort so longer aliases are tried first.
    pub fn seal(&mut self) {
        self.entries
            .sort_by(|a, b| b.alias_lower.len().cmp(&a.alias_lower.len()));
    }

    /// Extract entities in input order, case-insensitive, longest match wins.
    pub fn extract(&self, query: &str) -> Vec<ExtractedEntity> {
        let words = split_words(query);
        let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        // claimed[i] marks word i as consumed by an earlier (longer) alias.
        let mut claimed = vec![false; words.len()];
        let mut found: Vec<(usize, ExtractedEntity)> = Vec::new();

        for entry in &self.entries {
            let alias: Vec<&str> = entry.alias_lower.split_whitespace().collect();
            if alias.is_empty() {
                continue;
            }
            for start in 0..lower.len().saturating_sub(alias.len() - 1) {
                let span = start..start + alias.len();
                if span.clone().any(|i| claimed[i]) {
                    continue;
                }
                if lower[span.clone()].iter().map(String::as_str).eq(alias.iter().copied()) {
                    for i in span {
                        claimed[i] = true;
                    }
                    found.push((
                        start,
                        ExtractedEntity {
                            kind: entry.kind,
                            name: entry.canonical.clone(),
                        },
                    ));
                }
            }
        }

        found.sort_by_key(|(start, _)| *start);
        let mut seen = std::collections::HashSet::new();
        found
            .into_iter()
            .filter(|(_, e)| seen.insert((e.kind, e.name.clone())))
            .map(|(_, e)| e)
            .collect()
    }
}

fn split_words(query: &str) -> Vec<&str> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

// ── Intent classification ─────────────────────────────────────────────────────

/// Keyword rules per intent. Multiple matches resolve by the fixed priority
/// encoded in the scan order below: squad-fitness first, persona-general
/// (the fallback) last. Legend comparison needs both a cue word and a known
/// legend name, so it outranks the fixture keywords it shares "next" with.
pub fn classify_intent(query: &str, entities: &[ExtractedEntity]) -> Intent {
    let lower = query.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| contains_word(&lower, n));
    let has_phrase = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let legend_present = entities.iter().any(|e| e.kind == EntityKind::Legend);

    if has(&["injury", "injuries", "injured", "squad", "fitness", "fit"]) {
        return Intent::SquadFitness;
    }
    if has(&["signing", "signings", "transfer", "transfers", "rumour", "rumor", "loan"]) {
        return Intent::Transfers;
    }
    if legend_present
        && (has(&["next", "like", "vs"]) || has_phrase(&["reminds me of", "better than"]))
    {
        return Intent::LegendComparison;
    }
    if has(&["table", "standings", "points", "position"]) || has_phrase(&["top of"]) {
        return Intent::Standings;
    }
    if has(&["result", "results", "score", "scores", "scoreline"]) {
        return Intent::Scores;
    }
    if has(&["next", "upcoming", "schedule", "fixture", "fixtures"]) {
        return Intent::Fixtures;
    }
    if has(&["remember", "anniversary"]) || has_phrase(&["that game", "back in"]) {
        return Intent::Historical;
    }
    Intent::PersonaGeneral
}

fn contains_word(haystack_lower: &str, word: &str) -> bool {
    haystack_lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

// ── Date extraction ───────────────────────────────────────────────────────────

pub fn extract_date(query: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = query.to_lowercase();
    if contains_word(&lower, "yesterday") {
        return today.checked_sub_days(Days::new(1));
    }
    if contains_word(&lower, "today") {
        return Some(today);
    }
    if contains_word(&lower, "tomorrow") {
        return today.checked_add_days(Days::new(1));
    }
    // Explicit ISO dates pass through unchanged.
    for token in query.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit());
        if token.len() == 10 {
            if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    None
}

pub fn has_whole_list_modifier(query: &str) -> bool {
    let lower = query.to_lowercase();
    contains_word(&lower, "latest") || contains_word(&lower, "recent")
}

/// Parse a query end-to-end against the dictionary.
pub fn parse_query(query: &str, dict: &EntityDictionary, today: NaiveDate) -> ParsedQuery {
    let entities = dict.extract(query);
    let intent = classify_intent(query, &entities);
    let whole_list = matches!(intent, Intent::Scores | Intent::Fixtures)
        && has_whole_list_modifier(query);
    let date = if whole_list {
        None
    } else {
        extract_date(query, today)
    };
    ParsedQuery {
        entities,
        intent,
        date,
        whole_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> EntityDictionary {
        let mut d = EntityDictionary::default();
        d.add(EntityKind::Team, "Arsenal", "Arsenal");
        d.add(EntityKind::Team, "The Gunners", "Arsenal");
        d.add(EntityKind::Team, "Tottenham Hotspur", "Tottenham Hotspur");
        d.add(EntityKind::Team, "Tottenham", "Tottenham Hotspur");
        d.add(EntityKind::Team, "Spurs", "Tottenham Hotspur");
        d.add(EntityKind::Player, "Bukayo Saka", "Bukayo Saka");
        d.add(EntityKind::Legend, "Thierry Henry", "Thierry Henry");
        d.add(EntityKind::Legend, "Henry", "Thierry Henry");
        d.seal();
        d
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 19).unwrap()
    }

    #[test]
    fn longest_alias_wins_and_order_is_preserved() {
        let entities = dict().extract("did tottenham hotspur beat arsenal?");
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Tottenham Hotspur");
        assert_eq!(entities[1].name, "Arsenal");
    }

    #[test]
    fn aliases_map_to_canonical_names() {
        let entities = dict().extract("how are the gunners doing against spurs");
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Arsenal", "Tottenham Hotspur"]);
    }

    #[test]
    fn extraction_is_case_insensitive_and_deduplicated() {
        let entities = dict().extract("ARSENAL arsenal Arsenal");
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn squad_fitness_outranks_other_intents() {
        let d = dict();
        assert_eq!(
            classify_intent("any injuries before the next fixture?", &d.extract("")),
            Intent::SquadFitness
        );
    }

    #[test]
    fn legend_cue_with_legend_name_beats_fixtures() {
        let d = dict();
        let q = "is Saka the next Henry?";
        let entities = d.extract(q);
        assert_eq!(classify_intent(q, &entities), Intent::LegendComparison);
        // Same cue word without a legend name stays a fixtures query.
        assert_eq!(classify_intent("who do we play next?", &[]), Intent::Fixtures);
    }

    #[test]
    fn fallback_intent_is_persona_general() {
        assert_eq!(classify_intent("tell me something", &[]), Intent::PersonaGeneral);
    }

    #[test]
    fn relative_and_iso_dates_resolve_against_wall_clock() {
        assert_eq!(
            extract_date("scores from yesterday", today()),
            NaiveDate::from_ymd_opt(2025, 12, 18)
        );
        assert_eq!(extract_date("fixtures today", today()), Some(today()));
        assert_eq!(
            extract_date("what happened on 2024-04-28?", today()),
            NaiveDate::from_ymd_opt(2024, 4, 28)
        );
        assert_eq!(extract_date("no date here", today()), None);
    }

    #[test]
    fn latest_modifier_suppresses_dates_for_scores() {
        let parsed = parse_query("latest scores from yesterday", &dict(), today());
        assert_eq!(parsed.intent, Intent::Scores);
        assert!(parsed.whole_list);
        assert_eq!(parsed.date, None);
    }
}
