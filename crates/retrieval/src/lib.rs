//! Hybrid retrieval: parse the query, pull structured rows and full-text
//! hits for the detected intent, traverse the knowledge graph from seed
//! nodes, and fuse everything into a bounded, ranked context window.

mod fuse;
mod parse;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, instrument};

use terrace_config::RetrievalConfig;
use terrace_store::{
    FtsDomain, GraphHop, GraphNode, InjuryStatus, MatchFilter, MatchRecord, MatchStatus,
    PersonaIdentity, Relation, Store, StoreError, Team,
};

pub use fuse::{fingerprint, fuse, Candidate, EvidenceLine, SourceKind, SourceRef};
pub use parse::{
    classify_intent, extract_date, parse_query, EntityDictionary, EntityKind, ExtractedEntity,
    Intent, ParsedQuery,
};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RetrievalMetadata {
    pub intent: Intent,
    /// 0 = the primary filter produced rows; 1..3 = widening steps taken.
    pub fallback_step: u8,
    /// True when a "latest"/"recent" modifier discarded an extracted date.
    pub date_ignored: bool,
    pub fts_candidates: usize,
    pub graph_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct Retrieved {
    pub lines: Vec<EvidenceLine>,
    pub entities: Vec<ExtractedEntity>,
    pub metadata: RetrievalMetadata,
}

impl Retrieved {
    /// Source references for every delivered line, in rank order.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.lines
            .iter()
            .filter(|l| l.source.kind != SourceKind::Sentinel)
            .map(|l| l.source)
            .collect()
    }
}

pub struct Retriever {
    store: Arc<Store>,
    config: RetrievalConfig,
    max_query_chars: usize,
    dict: RwLock<EntityDictionary>,
}

impl Retriever {
    pub fn new(
        store: Arc<Store>,
        config: RetrievalConfig,
        max_query_chars: usize,
    ) -> Result<Self, RetrievalError> {
        let dict = EntityDictionary::from_store(&store)?;
        Ok(Self {
            store,
            config,
            max_query_chars,
            dict: RwLock::new(dict),
        })
    }

    /// Rebuild the entity dictionary after out-of-band ingestion.
    pub fn refresh_dictionary(&self) -> Result<(), RetrievalError> {
        let fresh = EntityDictionary::from_store(&self.store)?;
        if let Ok(mut guard) = self.dict.write() {
            *guard = fresh;
        }
        Ok(())
    }

    pub fn parse(&self, query: &str, today: NaiveDate) -> ParsedQuery {
        match self.dict.read() {
            Ok(dict) => parse_query(query, &dict, today),
            Err(_) => parse_query(query, &EntityDictionary::default(), today),
        }
    }

    #[instrument(skip(self, persona), fields(query_len = query.len()))]
    pub fn retrieve(
        &self,
        query: &str,
        persona: Option<&PersonaIdentity>,
        today: NaiveDate,
    ) -> Result<Retrieved, RetrievalError> {
        if query.contains('\0') {
            return Err(RetrievalError::InvalidQuery("null byte in query".to_string()));
        }
        if query.trim().chars().count() > self.max_query_chars {
            return Err(RetrievalError::InvalidQuery(format!(
                "query exceeds {} characters",
                self.max_query_chars
            )));
        }

        let parsed = self.parse(query, today);
        let team_names = self.team_name_index()?;
        let focus_team = self.focus_team(&parsed, persona)?;

        let mut candidates = Vec::new();
        let mut fallback_step = 0u8;

        self.structured_evidence(
            &parsed,
            focus_team.as_ref(),
            &team_names,
            &mut candidates,
            &mut fallback_step,
        )?;

        let fts_candidates = self.fts_evidence(query, parsed.intent, &mut candidates)?;
        let graph_candidates =
            self.graph_evidence(&parsed.entities, persona, &mut candidates)?;

        let lines = fuse(
            candidates,
            self.config.fusion_beta,
            self.config.fusion_gamma,
            self.config.context_max_lines,
        );

        debug!(
            intent = parsed.intent.as_str(),
            lines = lines.len(),
            fallback_step,
            "retrieval complete"
        );

        Ok(Retrieved {
            lines,
            entities: parsed.entities.clone(),
            metadata: RetrievalMetadata {
                intent: parsed.intent,
                fallback_step,
                date_ignored: parsed.whole_list,
                fts_candidates,
                graph_candidates,
            },
        })
    }

    // ── Structured rows per intent ───────────────────────────────────────────

    fn structured_evidence(
        &self,
        parsed: &ParsedQuery,
        focus_team: Option<&Team>,
        team_names: &HashMap<i64, String>,
        out: &mut Vec<Candidate>,
        fallback_step: &mut u8,
    ) -> Result<(), RetrievalError> {
        match parsed.intent {
            Intent::Standings => {
                let Some(league) = focus_team.map(|t| t.league.clone()) else {
                    return Ok(());
                };
                let Some(season) = self.store.latest_season(&league)? else {
                    return Ok(());
                };
                let rows = self.store.get_standings(&league, &season)?;
                let focus_id = focus_team.map(|t| t.id);
                for row in rows.iter() {
                    let in_top = row.position <= 5;
                    let is_focus = focus_id == Some(row.team_id);
                    if !in_top && !is_focus {
                        continue;
                    }
                    let name = team_names
                        .get(&row.team_id)
                        .cloned()
                        .unwrap_or_else(|| format!("team {}", row.team_id));
                    out.push(Candidate::fts(
                        format!(
                            "{} is {} with {} points",
                            name,
                            ordinal(row.position),
                            row.points
                        ),
                        SourceRef::new(SourceKind::Standing, row.team_id),
                        1.0,
                    ));
                }
            }
            Intent::Scores => {
                let matches = self.match_ladder(
                    parsed,
                    focus_team.map(|t| t.id),
                    MatchStatus::Finished,
                    true,
                    fallback_step,
                )?;
                for m in &matches {
                    out.push(Candidate::fts(
                        render_result(m, team_names),
                        SourceRef::new(SourceKind::Match, m.id),
                        1.0,
                    ));
                }
                if matches.is_empty() {
                    *fallback_step = 3;
                    out.push(Candidate::fts(
                        describe_no_data("finished matches", parsed.date, focus_team),
                        SourceRef::sentinel(),
                        0.1,
                    ));
                }
            }
            Intent::Fixtures => {
                let matches = self.match_ladder(
                    parsed,
                    focus_team.map(|t| t.id),
                    MatchStatus::Scheduled,
                    false,
                    fallback_step,
                )?;
                for m in &matches {
                    out.push(Candidate::fts(
                        render_fixture(m, team_names),
                        SourceRef::new(SourceKind::Match, m.id),
                        1.0,
                    ));
                }
                if matches.is_empty() {
                    *fallback_step = 3;
                    out.push(Candidate::fts(
                        describe_no_data("scheduled matches", parsed.date, focus_team),
                        SourceRef::sentinel(),
                        0.1,
                    ));
                }
            }
            Intent::SquadFitness => {
                let injuries = self
                    .store
                    .get_injuries(focus_team.map(|t| t.id), InjuryStatus::Active)?;
                for injury in injuries {
                    let back = injury
                        .expected_return
                        .map(|d| format!("expected back {d}"))
                        .unwrap_or_else(|| "return date unknown".to_string());
                    out.push(Candidate::fts(
                        format!("{} is out ({}, {})", injury.player_name, injury.kind, back),
                        SourceRef::new(SourceKind::Injury, injury.id),
                        1.0,
                    ));
                }
            }
            Intent::Transfers => {
                let transfers = self
                    .store
                    .get_transfers(focus_team.map(|t| t.id), Some(6))?;
                for transfer in transfers {
                    let to = transfer
                        .to_team_id
                        .and_then(|id| team_names.get(&id).cloned())
                        .unwrap_or_else(|| "a new club".to_string());
                    let fee = transfer.fee.as_deref().unwrap_or("undisclosed");
                    out.push(Candidate::fts(
                        format!(
                            "{} joined {} ({}, {})",
                            transfer.player_name,
                            to,
                            transfer.kind.as_str(),
                            fee
                        ),
                        SourceRef::new(SourceKind::Transfer, transfer.id),
                        1.0,
                    ));
                }
            }
            Intent::LegendComparison | Intent::Historical | Intent::PersonaGeneral => {}
        }
        Ok(())
    }

    /// The widening ladder for date-bounded match scans.
    ///
    /// Step 0: primary filter. Step 1: drop the date filter (also the entry
    /// point when a "latest"/"recent" modifier discarded the date up front).
    /// Step 2: invert the status filter, keeping the team filter. Step 3 (the
    /// sentinel) is the caller's job when even step 2 comes back empty.
    fn match_ladder(
        &self,
        parsed: &ParsedQuery,
        team_id: Option<i64>,
        status: MatchStatus,
        newest_first: bool,
        fallback_step: &mut u8,
    ) -> Result<Vec<MatchRecord>, RetrievalError> {
        let base = MatchFilter {
            team_id,
            status: Some(status),
            limit: Some(10),
            newest_first,
            ..MatchFilter::default()
        };

        if let Some(date) = parsed.date {
            let bounded = MatchFilter {
                date_from: Some(date),
                date_to: Some(date),
                ..base.clone()
            };
            let rows = self.store.list_matches(&bounded)?;
            if !rows.is_empty() {
                return Ok(rows);
            }
        }

        // Either the date-bounded scan came back empty or no date applied.
        if parsed.date.is_some() || parsed.whole_list {
            *fallback_step = (*fallback_step).max(1);
        }
        let rows = self.store.list_matches(&base)?;
        if !rows.is_empty() {
            return Ok(rows);
        }

        let inverted = MatchFilter {
            status: Some(match status {
                MatchStatus::Finished => MatchStatus::Scheduled,
                _ => MatchStatus::Finished,
            }),
            newest_first: !newest_first,
            ..base
        };
        *fallback_step = 2;
        Ok(self.store.list_matches(&inverted)?)
    }

    // ── Full-text channel ────────────────────────────────────────────────────

    fn fts_evidence(
        &self,
        query: &str,
        intent: Intent,
        out: &mut Vec<Candidate>,
    ) -> Result<usize, RetrievalError> {
        let domains: &[FtsDomain] = match intent {
            Intent::SquadFitness | Intent::Transfers | Intent::LegendComparison => {
                &[FtsDomain::Players, FtsDomain::News]
            }
            Intent::Standings | Intent::Scores | Intent::Fixtures => {
                &[FtsDomain::Teams, FtsDomain::News]
            }
            Intent::Historical => &[FtsDomain::News],
            Intent::PersonaGeneral => &[FtsDomain::Teams, FtsDomain::Players, FtsDomain::News],
        };

        let mut added = 0;
        for domain in domains {
            if added >= self.config.fts_combined_cap {
                break;
            }
            let hits = self
                .store
                .search_text(*domain, query, self.config.fts_top_k)?;
            for hit in hits {
                if added >= self.config.fts_combined_cap {
                    break;
                }
                let kind = match hit.domain {
                    FtsDomain::Teams => SourceKind::Team,
                    FtsDomain::Players => SourceKind::Player,
                    FtsDomain::News => SourceKind::News,
                };
                let text = if hit.detail.is_empty() {
                    hit.headline.clone()
                } else {
                    format!("{}: {}", hit.headline, hit.detail)
                };
                out.push(Candidate::fts(
                    text,
                    SourceRef::new(kind, hit.entity_id),
                    hit.score,
                ));
                added += 1;
            }
        }
        Ok(added)
    }

    // ── Graph channel ────────────────────────────────────────────────────────

    fn graph_evidence(
        &self,
        entities: &[ExtractedEntity],
        persona: Option<&PersonaIdentity>,
        out: &mut Vec<Candidate>,
    ) -> Result<usize, RetrievalError> {
        let mut seeds: Vec<GraphNode> = Vec::new();
        let mut seed_ids = std::collections::HashSet::new();

        for entity in entities {
            for node in self.store.search_graph_by_name(&entity.name)? {
                if seed_ids.insert(node.id) {
                    seeds.push(node);
                }
            }
        }
        if let Some(identity) = persona {
            if let Some(node) = self.store.team_node(identity.team_id)? {
                if seed_ids.insert(node.id) {
                    seeds.push(node);
                }
            }
        }

        let mut added = 0;
        for seed in &seeds {
            let hops = self.store.graph_neighbors(seed.id, None, 2)?;
            for hop in hops {
                let decay = if hop.depth <= 1 {
                    self.config.depth_decay_one
                } else {
                    self.config.depth_decay_two
                };
                let score = (hop.edge.weight * decay).clamp(0.0, 1.0);
                out.push(Candidate::graph(
                    render_hop(&hop),
                    SourceRef::new(SourceKind::GraphNode, hop.to.id),
                    score,
                ));
                added += 1;
            }
        }
        Ok(added)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn team_name_index(&self) -> Result<HashMap<i64, String>, RetrievalError> {
        Ok(self
            .store
            .list_teams()?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect())
    }

    /// The team the structured scans center on: first team entity in the
    /// query, else the active persona's team.
    fn focus_team(
        &self,
        parsed: &ParsedQuery,
        persona: Option<&PersonaIdentity>,
    ) -> Result<Option<Team>, RetrievalError> {
        for entity in &parsed.entities {
            if entity.kind == EntityKind::Team {
                if let Some(team) = self
                    .store
                    .get_team(terrace_store::TeamRef::Name(&entity.name))?
                {
                    return Ok(Some(team));
                }
            }
        }
        if let Some(identity) = persona {
            return Ok(self
                .store
                .get_team(terrace_store::TeamRef::Id(identity.team_id))?);
        }
        Ok(None)
    }
}

// ── Line rendering ────────────────────────────────────────────────────────────

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn team_label(id: i64, names: &HashMap<i64, String>) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("team {id}"))
}

fn render_result(m: &MatchRecord, names: &HashMap<i64, String>) -> String {
    let home = team_label(m.home_team_id, names);
    let away = team_label(m.away_team_id, names);
    match (m.home_score, m.away_score) {
        (Some(hs), Some(aw)) => format!("{home} {hs}-{aw} {away} on {}", m.date),
        _ => format!("{home} vs {away} on {} (no score recorded)", m.date),
    }
}

fn render_fixture(m: &MatchRecord, names: &HashMap<i64, String>) -> String {
    let home = team_label(m.home_team_id, names);
    let away = team_label(m.away_team_id, names);
    let comp = m
        .competition
        .as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default();
    format!("{home} vs {away} on {}{comp}", m.date)
}

fn describe_no_data(kind: &str, date: Option<NaiveDate>, team: Option<&Team>) -> String {
    let mut filter = kind.to_string();
    if let Some(team) = team {
        filter.push_str(&format!(" for {}", team.name));
    }
    if let Some(date) = date {
        filter.push_str(&format!(" on {date}"));
    }
    format!("no data found ({filter})")
}

fn render_hop(hop: &GraphHop) -> String {
    // Render along the edge's own direction, not the traversal direction.
    let (src, dst) = if hop.edge.source == hop.from.id {
        (&hop.from, &hop.to)
    } else {
        (&hop.to, &hop.from)
    };
    let base = match &hop.edge.relation {
        Relation::LegendaryAt => format!("{} is a club legend at {}", src.name, dst.name),
        Relation::OccurredAt => format!("{} happened at {}", src.name, dst.name),
        Relation::Against => format!("{} came against {}", src.name, dst.name),
        Relation::RivalOf => format!("{} and {} are fierce rivals", src.name, dst.name),
        Relation::CurrentState => format!("{} are currently {}", src.name, dst.name),
        Relation::Other(raw) => format!("{} {} {}", src.name, raw, dst.name),
    };
    let summary = hop
        .edge
        .properties
        .get("summary")
        .or_else(|| hop.to.properties.get("summary"))
        .and_then(|v| v.as_str());
    match summary {
        Some(text) => format!("{base}: {text}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use terrace_config::RetrievalConfig;
    use terrace_store::{
        FormString, MatchStatus, NewEdge, NewMatch, NewNode, NewTeam, NodeKind, PersonaIdentity,
        Relation, StandingRow, Store, VocabularyRules,
    };

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 12, 19)
    }

    struct Fixture {
        store: Arc<Store>,
        arsenal: i64,
        spurs: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let arsenal = store
            .insert_team(&NewTeam {
                name: "Arsenal".to_string(),
                short_name: "ARS".to_string(),
                league: "Premier League".to_string(),
                founded: Some(1886),
                stadium: Some("Emirates Stadium".to_string()),
                aliases: vec!["The Gunners".to_string()],
            })
            .unwrap();
        let spurs = store
            .insert_team(&NewTeam {
                name: "Tottenham Hotspur".to_string(),
                short_name: "TOT".to_string(),
                league: "Premier League".to_string(),
                founded: Some(1882),
                stadium: None,
                aliases: vec!["Tottenham".to_string(), "Spurs".to_string()],
            })
            .unwrap();
        Fixture {
            store,
            arsenal,
            spurs,
        }
    }

    fn persona_for(team_id: i64) -> PersonaIdentity {
        PersonaIdentity {
            team_id,
            nickname: "Gooner".to_string(),
            motto: String::new(),
            core_values: vec![],
            vocabulary: VocabularyRules::default(),
            baseline: "wounded-pride".to_string(),
            rivals: vec![],
            legends: vec![],
            moments: vec![],
        }
    }

    fn retriever(store: Arc<Store>) -> Retriever {
        Retriever::new(store, RetrievalConfig::default(), 1000).unwrap()
    }

    #[test]
    fn oversize_and_null_queries_are_invalid() {
        let f = fixture();
        let r = retriever(f.store.clone());
        let long = "x".repeat(1001);
        assert!(matches!(
            r.retrieve(&long, None, today()),
            Err(RetrievalError::InvalidQuery(_))
        ));
        assert!(matches!(
            r.retrieve("hello\0world", None, today()),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[test]
    fn standings_lines_render_position_and_points() {
        let f = fixture();
        f.store
            .upsert_standing(&StandingRow {
                team_id: f.arsenal,
                league: "Premier League".to_string(),
                season: "2025-26".to_string(),
                position: 1,
                played: 16,
                won: 12,
                drawn: 3,
                lost: 1,
                goals_for: 37,
                goals_against: 14,
                points: 39,
                form: FormString::parse("WWDWW").unwrap(),
            })
            .unwrap();
        let r = retriever(f.store.clone());

        let retrieved = r
            .retrieve("where are Arsenal in the table?", None, today())
            .unwrap();
        assert_eq!(retrieved.metadata.intent, Intent::Standings);
        assert!(retrieved
            .lines
            .iter()
            .any(|l| l.text == "Arsenal is 1st with 39 points"));
    }

    #[test]
    fn latest_scores_ignore_dates_and_record_fallback() {
        let f = fixture();
        for (day, hs, aws) in [(1, 2, 0), (8, 1, 1), (15, 0, 1)] {
            f.store
                .insert_match(&NewMatch {
                    date: date(2025, 11, day),
                    home_team_id: f.arsenal,
                    away_team_id: f.spurs,
                    home_score: Some(hs),
                    away_score: Some(aws),
                    status: MatchStatus::Finished,
                    competition: None,
                    venue: None,
                    events: vec![],
                })
                .unwrap();
        }
        let r = retriever(f.store.clone());

        // No games on 2025-12-19; the whole-list fallback must kick in.
        let retrieved = r.retrieve("latest scores", None, today()).unwrap();
        assert_eq!(retrieved.metadata.intent, Intent::Scores);
        assert!(retrieved.metadata.date_ignored);
        assert!(retrieved.metadata.fallback_step >= 1);
        let match_lines: Vec<&EvidenceLine> = retrieved
            .lines
            .iter()
            .filter(|l| l.source.kind == SourceKind::Match)
            .collect();
        assert!(!match_lines.is_empty() && match_lines.len() <= 10);
        // Newest first.
        assert!(match_lines[0].text.contains("2025-11-15"));
    }

    #[test]
    fn empty_store_reaches_the_sentinel_step() {
        let f = fixture();
        let r = retriever(f.store.clone());
        let retrieved = r
            .retrieve("scores from yesterday", None, today())
            .unwrap();
        assert_eq!(retrieved.metadata.fallback_step, 3);
        assert!(retrieved.lines.iter().any(|l| l.text.starts_with("no data found")));
        // Sentinel lines never count as sources.
        assert!(retrieved.sources().is_empty());
    }

    #[test]
    fn rival_mention_seeds_graph_traversal() {
        let f = fixture();
        let arsenal_node = f
            .store
            .insert_node(&NewNode {
                kind: NodeKind::Team,
                entity_id: Some(f.arsenal),
                name: "Arsenal".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let spurs_node = f
            .store
            .insert_node(&NewNode {
                kind: NodeKind::Team,
                entity_id: Some(f.spurs),
                name: "Tottenham Hotspur".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        f.store
            .insert_edge(&NewEdge {
                source: arsenal_node,
                target: spurs_node,
                relation: Relation::RivalOf,
                weight: 1.0,
                properties: serde_json::json!({"summary": "North London derby"}),
            })
            .unwrap();
        let r = retriever(f.store.clone());

        let retrieved = r
            .retrieve(
                "what do you think of Tottenham?",
                Some(&persona_for(f.arsenal)),
                today(),
            )
            .unwrap();
        let graph_lines: Vec<&EvidenceLine> = retrieved
            .lines
            .iter()
            .filter(|l| l.source.kind == SourceKind::GraphNode)
            .collect();
        assert!(!graph_lines.is_empty());
        assert!(graph_lines
            .iter()
            .any(|l| l.text.contains("fierce rivals") && l.text.contains("North London derby")));
    }

    #[test]
    fn graph_scores_decay_with_depth() {
        let f = fixture();
        let a = f
            .store
            .insert_node(&NewNode {
                kind: NodeKind::Team,
                entity_id: Some(f.arsenal),
                name: "Arsenal".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let b = f
            .store
            .insert_node(&NewNode {
                kind: NodeKind::Legend,
                entity_id: None,
                name: "Dennis Bergkamp".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let c = f
            .store
            .insert_node(&NewNode {
                kind: NodeKind::Moment,
                entity_id: None,
                name: "That goal at Newcastle".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        f.store
            .insert_edge(&NewEdge {
                source: b,
                target: a,
                relation: Relation::LegendaryAt,
                weight: 1.0,
                properties: serde_json::json!({}),
            })
            .unwrap();
        f.store
            .insert_edge(&NewEdge {
                source: c,
                target: b,
                relation: Relation::Against,
                weight: 1.0,
                properties: serde_json::json!({}),
            })
            .unwrap();
        let r = retriever(f.store.clone());

        let retrieved = r
            .retrieve("tell me about Arsenal", None, today())
            .unwrap();
        let legend = retrieved
            .lines
            .iter()
            .find(|l| l.text.contains("club legend"))
            .unwrap();
        let moment = retrieved
            .lines
            .iter()
            .find(|l| l.text.contains("came against"))
            .unwrap();
        assert!(legend.score > moment.score, "depth-2 hop must score lower");
    }

    #[test]
    fn dictionary_refresh_picks_up_new_teams() {
        let f = fixture();
        let r = retriever(f.store.clone());
        f.store
            .insert_team(&NewTeam {
                name: "Chelsea".to_string(),
                short_name: "CHE".to_string(),
                league: "Premier League".to_string(),
                founded: Some(1905),
                stadium: Some("Stamford Bridge".to_string()),
                aliases: vec![],
            })
            .unwrap();

        let stale = r.parse("any chelsea news", today());
        assert!(stale.entities.is_empty());

        r.refresh_dictionary().unwrap();
        let fresh = r.parse("any chelsea news", today());
        assert_eq!(fresh.entities.len(), 1);
        assert_eq!(fresh.entities[0].name, "Chelsea");
    }

    #[test]
    fn fts_results_are_capped() {
        let f = fixture();
        for i in 0..30 {
            f.store
                .insert_news(
                    &format!("Arsenal news item {i}"),
                    "Arsenal Arsenal Arsenal",
                    chrono::Utc::now(),
                    Some(f.arsenal),
                )
                .unwrap();
        }
        let mut config = RetrievalConfig::default();
        config.fts_top_k = 50;
        config.fts_combined_cap = 8;
        let r = Retriever::new(f.store.clone(), config, 1000).unwrap();
        let retrieved = r.retrieve("tell me about Arsenal", None, today()).unwrap();
        assert!(retrieved.metadata.fts_candidates <= 8);
    }
}
