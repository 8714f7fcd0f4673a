//! Context enrichment: mood plus at most one compact block per trigger.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use terrace_store::{
    FormString, InjuryStatus, NodeKind, PersonaIdentity, Relation, Store, StoreError,
};

use crate::mood::{derive_mood, MoodSnapshot, MoodTag};
use crate::triggers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Rivalry,
    SquadFitness,
    Legend,
    Anniversary,
}

impl EnrichmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrichmentKind::Rivalry => "rivalry",
            EnrichmentKind::SquadFitness => "squad_fitness",
            EnrichmentKind::Legend => "legend",
            EnrichmentKind::Anniversary => "anniversary",
        }
    }
}

/// One tagged evidence block for the prompt synthesizer.
#[derive(Debug, Clone)]
pub struct EnrichmentBlock {
    pub kind: EnrichmentKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Enrichment {
    pub blocks: Vec<EnrichmentBlock>,
    pub applied: Vec<EnrichmentKind>,
    pub mood: MoodSnapshot,
    pub form: FormString,
}

pub struct Enricher {
    store: Arc<Store>,
    /// When false, a mood node persisted in the graph is consulted first and
    /// the form derivation becomes the fallback. Persisted mood is seed data,
    /// never authoritative, so the default derives from form.
    mood_from_form: bool,
}

impl Enricher {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_mood_policy(store, true)
    }

    pub fn with_mood_policy(store: Arc<Store>, mood_from_form: bool) -> Self {
        Self {
            store,
            mood_from_form,
        }
    }

    /// Derive the turn's mood and inject blocks for every detected trigger.
    /// The persona bundle itself is the caller's cached snapshot; only form
    /// and the injury list are read fresh.
    pub fn enrich(
        &self,
        query: &str,
        persona: &PersonaIdentity,
        today: NaiveDate,
    ) -> Result<Enrichment, StoreError> {
        let form = self.store.current_form(persona.team_id, FormString::LEN)?;
        let mood = self.mood_for(persona.team_id, &form)?;

        let mut blocks = Vec::new();

        if let Some(rival) = triggers::rival_mention(query, persona) {
            let banter = if rival.banter.is_empty() {
                String::new()
            } else {
                format!(" Banter: {}", rival.banter.join("; "))
            };
            blocks.push(EnrichmentBlock {
                kind: EnrichmentKind::Rivalry,
                text: format!(
                    "[rivalry] {} (intensity {}/10; {}).{}",
                    rival.name, rival.intensity, rival.origin, banter
                ),
            });
        }

        if triggers::squad_query(query) {
            let injuries = self
                .store
                .get_injuries(Some(persona.team_id), InjuryStatus::Active)?;
            let list = if injuries.is_empty() {
                "fully fit squad, no absences reported".to_string()
            } else {
                injuries
                    .iter()
                    .map(|i| {
                        let back = i
                            .expected_return
                            .map(|d| format!("back {d}"))
                            .unwrap_or_else(|| "no return date".to_string());
                        format!("{} ({}, {})", i.player_name, i.kind, back)
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            blocks.push(EnrichmentBlock {
                kind: EnrichmentKind::SquadFitness,
                text: format!("[squad] {list}"),
            });
        }

        if let Some(legend) = triggers::legend_comparison(query, persona) {
            let era = legend
                .era
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default();
            blocks.push(EnrichmentBlock {
                kind: EnrichmentKind::Legend,
                text: format!("[legend] {}{era}: {}", legend.name, legend.summary),
            });
        }

        if let Some(moment) = triggers::anniversary(persona, today) {
            let date = moment
                .date
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            blocks.push(EnrichmentBlock {
                kind: EnrichmentKind::Anniversary,
                text: format!(
                    "[moment] On this day: {}{date}: {}",
                    moment.title, moment.summary
                ),
            });
        }

        let applied: Vec<EnrichmentKind> = blocks.iter().map(|b| b.kind).collect();
        debug!(
            team = persona.team_id,
            mood = mood.tag.as_str(),
            blocks = blocks.len(),
            "persona enrichment"
        );

        Ok(Enrichment {
            blocks,
            applied,
            mood,
            form,
        })
    }

    fn mood_for(&self, team_id: i64, form: &FormString) -> Result<MoodSnapshot, StoreError> {
        if !self.mood_from_form {
            if let Some(snapshot) = self.persisted_mood(team_id)? {
                return Ok(snapshot);
            }
        }
        Ok(derive_mood(form))
    }

    /// A mood node attached to the team via `current_state`, when one was
    /// ingested. Intensity comes from the node's property bag.
    fn persisted_mood(&self, team_id: i64) -> Result<Option<MoodSnapshot>, StoreError> {
        let Some(team_node) = self.store.team_node(team_id)? else {
            return Ok(None);
        };
        let hops = self
            .store
            .graph_neighbors(team_node.id, Some(&[Relation::CurrentState]), 1)?;
        for hop in hops {
            let node = &hop.to;
            if node.kind != NodeKind::Mood {
                continue;
            }
            let Some(tag) = MoodTag::parse(&node.name) else {
                continue;
            };
            let intensity = node
                .properties
                .get("intensity")
                .and_then(|value| value.as_f64())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            return Ok(Some(MoodSnapshot {
                tag,
                intensity,
                ratio: intensity,
                derived_from_form: false,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use terrace_store::{
        LegendSummary, MatchStatus, MomentSummary, NewMatch, NewPlayer, NewTeam, RivalSummary,
        VocabularyRules,
    };

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded() -> (Arc<Store>, PersonaIdentity) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let arsenal = store
            .insert_team(&NewTeam {
                name: "Arsenal".to_string(),
                short_name: "ARS".to_string(),
                league: "Premier League".to_string(),
                founded: None,
                stadium: None,
                aliases: vec![],
            })
            .unwrap();
        let spurs = store
            .insert_team(&NewTeam {
                name: "Tottenham Hotspur".to_string(),
                short_name: "TOT".to_string(),
                league: "Premier League".to_string(),
                founded: None,
                stadium: None,
                aliases: vec![],
            })
            .unwrap();

        // WWDWW, newest first: 11/15 points.
        let results = [(15, 2, 0), (12, 3, 1), (9, 1, 1), (6, 2, 1), (3, 1, 0)];
        for (day, hs, aws) in results {
            store
                .insert_match(&NewMatch {
                    date: date(2025, 11, day),
                    home_team_id: arsenal,
                    away_team_id: spurs,
                    home_score: Some(hs),
                    away_score: Some(aws),
                    status: MatchStatus::Finished,
                    competition: None,
                    venue: None,
                    events: vec![],
                })
                .unwrap();
        }

        let persona = PersonaIdentity {
            team_id: arsenal,
            nickname: "Gooner".to_string(),
            motto: String::new(),
            core_values: vec![],
            vocabulary: VocabularyRules::default(),
            baseline: "wounded-pride".to_string(),
            rivals: vec![RivalSummary {
                name: "Tottenham Hotspur".to_string(),
                intensity: 10,
                origin: "North London derby".to_string(),
                banter: vec!["St Totteringham's Day".to_string()],
            }],
            legends: vec![LegendSummary {
                name: "Thierry Henry".to_string(),
                era: Some("1999-2007".to_string()),
                summary: "Record scorer.".to_string(),
            }],
            moments: vec![MomentSummary {
                title: "The Invincibles".to_string(),
                date: Some(date(2004, 5, 15)),
                opponent: None,
                summary: "Unbeaten season.".to_string(),
            }],
        };
        (store, persona)
    }

    #[test]
    fn mood_comes_from_live_form() {
        let (store, persona) = seeded();
        let enricher = Enricher::new(store);
        let enrichment = enricher
            .enrich("how's it going?", &persona, date(2025, 12, 19))
            .unwrap();
        assert_eq!(enrichment.form.as_str(), "WWDWW");
        assert_eq!(enrichment.mood.tag.as_str(), "hopeful");
        assert!(enrichment.mood.intensity > 0.72 && enrichment.mood.intensity < 0.74);
        assert!(enrichment.applied.is_empty());
    }

    #[test]
    fn rival_mention_injects_one_rivalry_block() {
        let (store, persona) = seeded();
        let enricher = Enricher::new(store);
        let enrichment = enricher
            .enrich(
                "what do you think of Tottenham Hotspur?",
                &persona,
                date(2025, 12, 19),
            )
            .unwrap();
        assert_eq!(enrichment.applied, vec![EnrichmentKind::Rivalry]);
        let block = &enrichment.blocks[0];
        assert!(block.text.contains("intensity 10/10"));
        assert!(block.text.contains("St Totteringham's Day"));
    }

    #[test]
    fn squad_query_lists_current_injuries() {
        let (store, persona) = seeded();
        let saka = store
            .insert_player(&NewPlayer {
                name: "Bukayo Saka".to_string(),
                team_id: Some(persona.team_id),
                position: Some("RW".to_string()),
                nationality: Some("England".to_string()),
                born: None,
            })
            .unwrap();
        store
            .insert_injury(saka, "hamstring", Some("minor"), Some(date(2026, 1, 4)), InjuryStatus::Active)
            .unwrap();

        let enricher = Enricher::new(store);
        let enrichment = enricher
            .enrich("any injuries in the squad?", &persona, date(2025, 12, 19))
            .unwrap();
        assert!(enrichment.applied.contains(&EnrichmentKind::SquadFitness));
        let squad = enrichment
            .blocks
            .iter()
            .find(|b| b.kind == EnrichmentKind::SquadFitness)
            .unwrap();
        assert!(squad.text.contains("Bukayo Saka"));
        assert!(squad.text.contains("hamstring"));
    }

    #[test]
    fn anniversary_block_appears_on_the_matching_day() {
        let (store, persona) = seeded();
        let enricher = Enricher::new(store);
        let enrichment = enricher
            .enrich("morning!", &persona, date(2026, 5, 15))
            .unwrap();
        assert_eq!(enrichment.applied, vec![EnrichmentKind::Anniversary]);
        assert!(enrichment.blocks[0].text.contains("The Invincibles"));
    }

    #[test]
    fn persisted_mood_node_is_consulted_only_when_configured() {
        let (store, persona) = seeded();
        let team_node = store
            .insert_node(&terrace_store::NewNode {
                kind: terrace_store::NodeKind::Team,
                entity_id: Some(persona.team_id),
                name: "Arsenal".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let mood_node = store
            .insert_node(&terrace_store::NewNode {
                kind: terrace_store::NodeKind::Mood,
                entity_id: None,
                name: "depressed".to_string(),
                properties: serde_json::json!({"intensity": 0.9}),
            })
            .unwrap();
        store
            .insert_edge(&terrace_store::NewEdge {
                source: team_node,
                target: mood_node,
                relation: terrace_store::Relation::CurrentState,
                weight: 1.0,
                properties: serde_json::json!({}),
            })
            .unwrap();

        // Default policy: form wins, the node is just graph evidence.
        let from_form = Enricher::new(Arc::clone(&store))
            .enrich("how are we?", &persona, date(2025, 12, 19))
            .unwrap();
        assert_eq!(from_form.mood.tag.as_str(), "hopeful");
        assert!(from_form.mood.derived_from_form);

        // Seed policy: the persisted node is preferred when present.
        let from_node = Enricher::with_mood_policy(store, false)
            .enrich("how are we?", &persona, date(2025, 12, 19))
            .unwrap();
        assert_eq!(from_node.mood.tag.as_str(), "depressed");
        assert!((from_node.mood.intensity - 0.9).abs() < 1e-9);
        assert!(!from_node.mood.derived_from_form);
    }

    #[test]
    fn legend_comparison_block_carries_the_summary() {
        let (store, persona) = seeded();
        let enricher = Enricher::new(store);
        let enrichment = enricher
            .enrich("is Saka the next Thierry Henry?", &persona, date(2025, 12, 19))
            .unwrap();
        assert!(enrichment.applied.contains(&EnrichmentKind::Legend));
        let legend = enrichment
            .blocks
            .iter()
            .find(|b| b.kind == EnrichmentKind::Legend)
            .unwrap();
        assert!(legend.text.contains("Thierry Henry"));
        assert!(legend.text.contains("Record scorer."));
    }
}
