//! Per-conversation state: recent entities, last intent, delivered facts.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use terrace_retrieval::{fingerprint, EntityKind, ExtractedEntity, Intent};
use terrace_store::PersonaIdentity;

/// Recent entity names retained per kind.
pub const LAST_ENTITY_CAP: usize = 5;

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub id: String,
    /// Fixed on creation; a conversation never changes persona.
    pub persona_id: Option<String>,
    last_entities: BTreeMap<EntityKind, VecDeque<String>>,
    pub last_intent: Option<Intent>,
    pub turn_count: u64,
    discussed_facts: HashSet<String>,
    /// Bundle snapshot loaded on first use, reused for the conversation's life.
    pub persona: Option<Arc<PersonaIdentity>>,
    /// Canonical team name backing the persona, for first-person resolution.
    pub persona_team_name: Option<String>,
    recent_turns: VecDeque<(String, String)>,
    pub last_updated: DateTime<Utc>,
}

/// Prior exchanges retained for generator history.
pub const RECENT_TURN_CAP: usize = 6;

impl ConversationState {
    pub fn new(id: impl Into<String>, persona_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            persona_id,
            last_entities: BTreeMap::new(),
            last_intent: None,
            turn_count: 0,
            discussed_facts: HashSet::new(),
            persona: None,
            persona_team_name: None,
            recent_turns: VecDeque::new(),
            last_updated: Utc::now(),
        }
    }

    /// Most recently seen entity of a kind.
    pub fn last_entity(&self, kind: EntityKind) -> Option<&str> {
        self.last_entities
            .get(&kind)
            .and_then(|names| names.back())
            .map(String::as_str)
    }

    pub fn note_entity(&mut self, kind: EntityKind, name: &str) {
        let names = self.last_entities.entry(kind).or_default();
        if names.back().map(String::as_str) == Some(name) {
            return;
        }
        names.retain(|n| n != name);
        names.push_back(name.to_string());
        while names.len() > LAST_ENTITY_CAP {
            names.pop_front();
        }
    }

    pub fn entities(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.last_entities
            .get(&kind)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    pub fn has_discussed(&self, fp: &str) -> bool {
        self.discussed_facts.contains(fp)
    }

    pub fn discussed_count(&self) -> usize {
        self.discussed_facts.len()
    }

    /// Seed a fact fingerprint directly (restore paths and tests).
    pub fn mark_discussed(&mut self, line: &str) {
        self.discussed_facts.insert(fingerprint(line));
    }

    /// Drop lines whose fingerprint was already delivered this conversation.
    /// Applying this twice with unchanged state yields the same result.
    pub fn dedupe_context<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        lines
            .iter()
            .map(|l| l.as_ref())
            .filter(|l| {
                let fp = fingerprint(l);
                !self.discussed_facts.contains(&fp) && seen.insert(fp)
            })
            .map(|l| l.to_string())
            .collect()
    }

    /// Fold a completed turn into the state. The discussed-fact set only
    /// grows; fingerprints are never pruned while the conversation lives.
    pub fn update<S: AsRef<str>>(
        &mut self,
        entities: &[ExtractedEntity],
        intent: Intent,
        delivered_lines: &[S],
    ) {
        for line in delivered_lines {
            self.discussed_facts.insert(fingerprint(line.as_ref()));
        }
        for entity in entities {
            self.note_entity(entity.kind, &entity.name);
        }
        self.last_intent = Some(intent);
        self.turn_count += 1;
        self.last_updated = Utc::now();
    }

    /// Advance the turn counter without committing facts or entities, for
    /// degraded turns where nothing was reliably delivered.
    pub fn bump_turn(&mut self) {
        self.turn_count += 1;
        self.last_updated = Utc::now();
    }

    /// Record a completed exchange for generator history.
    pub fn note_turn(&mut self, user: &str, assistant: &str) {
        self.recent_turns
            .push_back((user.to_string(), assistant.to_string()));
        while self.recent_turns.len() > RECENT_TURN_CAP {
            self.recent_turns.pop_front();
        }
    }

    /// Prior (user, assistant) exchanges, oldest first.
    pub fn recent_turns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.recent_turns
            .iter()
            .map(|(user, assistant)| (user.as_str(), assistant.as_str()))
    }
}
