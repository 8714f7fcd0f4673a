use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Structured records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub league: String,
    pub founded: Option<i32>,
    pub stadium: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub team_id: Option<i64>,
    pub position: Option<String>,
    pub nationality: Option<String>,
    pub born: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(MatchStatus::Scheduled),
            "live" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            "postponed" => Some(MatchStatus::Postponed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: MatchStatus,
    pub competition: Option<String>,
    pub venue: Option<String>,
    pub events: Vec<String>,
}

impl MatchRecord {
    /// W/D/L from the given team's perspective; `None` for teams not involved
    /// or matches without a full score.
    pub fn outcome_for(&self, team_id: i64) -> Option<char> {
        let (home, away) = (self.home_score?, self.away_score?);
        let diff = if team_id == self.home_team_id {
            home - away
        } else if team_id == self.away_team_id {
            away - home
        } else {
            return None;
        };
        Some(match diff {
            d if d > 0 => 'W',
            0 => 'D',
            _ => 'L',
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRow {
    pub team_id: i64,
    pub league: String,
    pub season: String,
    pub position: u32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
    pub form: FormString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryStatus {
    Active,
    Recovered,
    Unknown,
}

impl InjuryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InjuryStatus::Active => "active",
            InjuryStatus::Recovered => "recovered",
            InjuryStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => InjuryStatus::Active,
            "recovered" => InjuryStatus::Recovered,
            _ => InjuryStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Injury {
    pub id: i64,
    pub player_id: i64,
    pub player_name: String,
    pub kind: String,
    pub severity: Option<String>,
    pub expected_return: Option<NaiveDate>,
    pub status: InjuryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Permanent,
    Loan,
    Free,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::Permanent => "permanent",
            TransferKind::Loan => "loan",
            TransferKind::Free => "free",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "permanent" => Some(TransferKind::Permanent),
            "loan" => Some(TransferKind::Loan),
            "free" => Some(TransferKind::Free),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub player_id: i64,
    pub player_name: String,
    pub from_team_id: Option<i64>,
    pub to_team_id: Option<i64>,
    pub kind: TransferKind,
    pub fee: Option<String>,
    pub effective: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub published: DateTime<Utc>,
    pub team_id: Option<i64>,
}

// ── Form string ───────────────────────────────────────────────────────────────

/// Last-five-results summary, exactly five characters from `{W, D, L, -}`.
/// `-` marks a slot with no data. Most recent result first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormString([u8; 5]);

impl FormString {
    pub const LEN: usize = 5;

    pub fn empty() -> Self {
        FormString([b'-'; 5])
    }

    /// Build from outcomes ordered most-recent-first, padding with `-`.
    pub fn from_outcomes(outcomes: &[char]) -> Self {
        let mut slots = [b'-'; 5];
        for (slot, ch) in slots.iter_mut().zip(outcomes.iter()) {
            if matches!(ch, 'W' | 'D' | 'L') {
                *slot = *ch as u8;
            }
        }
        FormString(slots)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let bytes = raw.as_bytes();
        if bytes.len() != 5 {
            return Err(format!("form string must be 5 chars, got {}", bytes.len()));
        }
        let mut slots = [b'-'; 5];
        for (slot, b) in slots.iter_mut().zip(bytes.iter()) {
            match b {
                b'W' | b'D' | b'L' | b'-' => *slot = *b,
                other => return Err(format!("invalid form char {:?}", *other as char)),
            }
        }
        Ok(FormString(slots))
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII from {W, D, L, -}.
        std::str::from_utf8(&self.0).unwrap_or("-----")
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().map(|b| *b as char)
    }

    /// Number of slots holding a real result.
    pub fn played(&self) -> usize {
        self.0.iter().filter(|b| **b != b'-').count()
    }

    /// League points over the recorded slots: 3 per win, 1 per draw.
    pub fn points(&self) -> u32 {
        self.0
            .iter()
            .map(|b| match b {
                b'W' => 3,
                b'D' => 1,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for FormString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for FormString {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FormString::parse(&value)
    }
}

impl From<FormString> for String {
    fn from(value: FormString) -> Self {
        value.as_str().to_string()
    }
}

// ── Knowledge graph ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Team,
    Legend,
    Moment,
    Mood,
    Rivalry,
    Other,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Team => "team",
            NodeKind::Legend => "legend",
            NodeKind::Moment => "moment",
            NodeKind::Mood => "mood",
            NodeKind::Rivalry => "rivalry",
            NodeKind::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "team" => NodeKind::Team,
            "legend" => NodeKind::Legend,
            "moment" => NodeKind::Moment,
            "mood" => NodeKind::Mood,
            "rivalry" => NodeKind::Rivalry,
            _ => NodeKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    LegendaryAt,
    OccurredAt,
    Against,
    RivalOf,
    CurrentState,
    Other(String),
}

impl Relation {
    pub fn as_str(&self) -> &str {
        match self {
            Relation::LegendaryAt => "legendary_at",
            Relation::OccurredAt => "occurred_at",
            Relation::Against => "against",
            Relation::RivalOf => "rival_of",
            Relation::CurrentState => "current_state",
            Relation::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "legendary_at" => Relation::LegendaryAt,
            "occurred_at" => Relation::OccurredAt,
            "against" => Relation::Against,
            "rival_of" => Relation::RivalOf,
            "current_state" => Relation::CurrentState,
            other => Relation::Other(other.to_string()),
        }
    }

    /// The relations followed by default during context traversal.
    pub fn traversal_set() -> Vec<Relation> {
        vec![
            Relation::LegendaryAt,
            Relation::OccurredAt,
            Relation::Against,
            Relation::RivalOf,
            Relation::CurrentState,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub kind: NodeKind,
    /// Pointer into the matching relational table, when one exists.
    pub entity_id: Option<i64>,
    pub name: String,
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: i64,
    pub source: i64,
    pub target: i64,
    pub relation: Relation,
    pub weight: f64,
    pub properties: BTreeMap<String, serde_json::Value>,
}

// ── Persona identity ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyRules {
    /// Word → replacement applied to generated text, whole-word.
    pub substitutions: BTreeMap<String, String>,
    pub forbidden_topics: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RivalSummary {
    pub name: String,
    /// 1 (mild needle) to 10 (derby hatred).
    pub intensity: u8,
    pub origin: String,
    pub banter: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegendSummary {
    pub name: String,
    pub era: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentSummary {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub opponent: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaIdentity {
    pub team_id: i64,
    pub nickname: String,
    pub motto: String,
    pub core_values: Vec<String>,
    pub vocabulary: VocabularyRules,
    /// Emotional baseline tag, e.g. "wounded-pride" or "quiet-confidence".
    pub baseline: String,
    pub rivals: Vec<RivalSummary>,
    pub legends: Vec<LegendSummary>,
    pub moments: Vec<MomentSummary>,
}

// ── Session & observability rows ──────────────────────────────────────────────

/// Durable mirror of a session's trust bookkeeping. A missing row means the
/// session was never seen and starts at the lowest level; an unreachable
/// store surfaces as `StoreError`, never as an empty row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateRow {
    pub session_id: String,
    pub level: u8,
    pub clean_streak: u32,
    pub strike_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLogEntry {
    pub session_id: String,
    pub at: DateTime<Utc>,
    pub pattern: String,
    /// Length of the offending input. The raw content is never stored.
    pub input_len: usize,
    pub response_class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub at: DateTime<Utc>,
    pub conversation_id: String,
    pub persona_id: Option<String>,
    pub intent: Option<String>,
    pub source_count: usize,
    pub confidence: f64,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub cancelled: bool,
}
