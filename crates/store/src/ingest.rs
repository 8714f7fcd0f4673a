//! Out-of-band ingestion writes.
//!
//! The request pipeline never calls these; they exist for seeders, scrapers
//! and test fixtures. Full-text corpora are kept in sync by inserting into
//! the FTS shadow table alongside the base row.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;

use crate::error::Result;
use crate::store::Store;
use crate::types::*;

#[derive(Debug, Clone, Default)]
pub struct NewTeam {
    pub name: String,
    pub short_name: String,
    pub league: String,
    pub founded: Option<i32>,
    pub stadium: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPlayer {
    pub name: String,
    pub team_id: Option<i64>,
    pub position: Option<String>,
    pub nationality: Option<String>,
    pub born: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewMatch {
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

#[derive(Debug, Clone)]
pub struct NewNode {
    pub kind: NodeKind,
    pub entity_id: Option<i64>,
    pub name: String,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source: i64,
    pub target: i64,
    pub relation: Relation,
    pub weight: f64,
    pub properties: serde_json::Value,
}

impl Store {
    pub fn insert_team(&self, team: &NewTeam) -> Result<i64> {
        let aliases = serde_json::to_string(&team.aliases)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO team (name, short_name, league, founded, stadium, aliases) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                team.name,
                team.short_name,
                team.league,
                team.founded,
                team.stadium,
                aliases,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO fts_teams (team_id, name, short_name, league, stadium) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                team.name,
                team.short_name,
                team.league,
                team.stadium.as_deref().unwrap_or(""),
            ],
        )?;
        Ok(id)
    }

    pub fn insert_player(&self, player: &NewPlayer) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO player (name, team_id, position, nationality, born) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                player.name,
                player.team_id,
                player.position,
                player.nationality,
                player.born,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO fts_players (player_id, name, position, nationality) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                player.name,
                player.position.as_deref().unwrap_or(""),
                player.nationality.as_deref().unwrap_or(""),
            ],
        )?;
        Ok(id)
    }

    pub fn insert_match(&self, record: &NewMatch) -> Result<i64> {
        let events = serde_json::to_string(&record.events)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO matches (date, home_team_id, away_team_id, home_score, away_score, \
                                  status, competition, venue, events) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.date,
                record.home_team_id,
                record.away_team_id,
                record.home_score,
                record.away_score,
                record.status.as_str(),
                record.competition,
                record.venue,
                events,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn upsert_standing(&self, row: &StandingRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO standing (team_id, league, season, position, played, won, drawn, lost, \
                                   goals_for, goals_against, points, form) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             ON CONFLICT(team_id, league, season) DO UPDATE SET \
                position = excluded.position, played = excluded.played, won = excluded.won, \
                drawn = excluded.drawn, lost = excluded.lost, goals_for = excluded.goals_for, \
                goals_against = excluded.goals_against, points = excluded.points, \
                form = excluded.form",
            params![
                row.team_id,
                row.league,
                row.season,
                row.position,
                row.played,
                row.won,
                row.drawn,
                row.lost,
                row.goals_for,
                row.goals_against,
                row.points,
                row.form.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_injury(
        &self,
        player_id: i64,
        kind: &str,
        severity: Option<&str>,
        expected_return: Option<NaiveDate>,
        status: InjuryStatus,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO injury (player_id, kind, severity, expected_return, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![player_id, kind, severity, expected_return, status.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_transfer(
        &self,
        player_id: i64,
        from_team_id: Option<i64>,
        to_team_id: Option<i64>,
        kind: TransferKind,
        fee: Option<&str>,
        effective: NaiveDate,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transfer (player_id, from_team_id, to_team_id, kind, fee, effective) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                player_id,
                from_team_id,
                to_team_id,
                kind.as_str(),
                fee,
                effective,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_news(
        &self,
        title: &str,
        body: &str,
        published: DateTime<Utc>,
        team_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO news (title, body, published, team_id) VALUES (?1, ?2, ?3, ?4)",
            params![title, body, published, team_id],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO fts_news (news_id, title, body) VALUES (?1, ?2, ?3)",
            params![id, title, body],
        )?;
        Ok(id)
    }

    pub fn insert_node(&self, node: &NewNode) -> Result<i64> {
        let properties = serde_json::to_string(&node.properties)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kg_node (kind, entity_id, name, properties) VALUES (?1, ?2, ?3, ?4)",
            params![node.kind.as_str(), node.entity_id, node.name, properties],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_edge(&self, edge: &NewEdge) -> Result<i64> {
        let properties = serde_json::to_string(&edge.properties)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kg_edge (source, target, relation, weight, properties) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.source,
                edge.target,
                edge.relation.as_str(),
                edge.weight.clamp(0.0, 1.0),
                properties,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a node; its edges cascade.
    pub fn delete_node(&self, node_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM kg_node WHERE id = ?1", params![node_id])?;
        Ok(deleted > 0)
    }

    pub fn insert_persona(&self, identity: &PersonaIdentity) -> Result<()> {
        let core_values = serde_json::to_string(&identity.core_values)?;
        let substitutions = serde_json::to_string(&identity.vocabulary.substitutions)?;
        let forbidden = serde_json::to_string(&identity.vocabulary.forbidden_topics)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO persona (team_id, nickname, motto, core_values, substitutions, \
                                  forbidden_topics, baseline) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                identity.team_id,
                identity.nickname,
                identity.motto,
                core_values,
                substitutions,
                forbidden,
                identity.baseline,
            ],
        )?;
        for rival in &identity.rivals {
            conn.execute(
                "INSERT INTO persona_rival (team_id, name, intensity, origin, banter) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identity.team_id,
                    rival.name,
                    rival.intensity as i64,
                    rival.origin,
                    serde_json::to_string(&rival.banter)?,
                ],
            )?;
        }
        for legend in &identity.legends {
            conn.execute(
                "INSERT INTO persona_legend (team_id, name, era, summary) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![identity.team_id, legend.name, legend.era, legend.summary],
            )?;
        }
        for moment in &identity.moments {
            conn.execute(
                "INSERT INTO persona_moment (team_id, title, date, opponent, summary) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identity.team_id,
                    moment.title,
                    moment.date,
                    moment.opponent,
                    moment.summary,
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;

    use super::*;
    use crate::fts::FtsDomain;
    use crate::store::{MatchFilter, TeamRef};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_two_teams(store: &Store) -> (i64, i64) {
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
                stadium: Some("Tottenham Hotspur Stadium".to_string()),
                aliases: vec!["Spurs".to_string(), "Tottenham".to_string()],
            })
            .unwrap();
        (arsenal, spurs)
    }

    fn finished(home: i64, away: i64, hs: i32, aw: i32, on: NaiveDate) -> NewMatch {
        NewMatch {
            date: on,
            home_team_id: home,
            away_team_id: away,
            home_score: Some(hs),
            away_score: Some(aw),
            status: MatchStatus::Finished,
            competition: Some("Premier League".to_string()),
            venue: None,
            events: vec![],
        }
    }

    #[test]
    fn team_lookup_by_name_short_name_and_alias() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, _) = seed_two_teams(&store);

        let by_name = store.get_team(TeamRef::Name("arsenal")).unwrap().unwrap();
        assert_eq!(by_name.id, arsenal);
        let by_short = store.get_team(TeamRef::Name("TOT")).unwrap().unwrap();
        assert_eq!(by_short.name, "Tottenham Hotspur");
        let by_alias = store.get_team(TeamRef::Name("spurs")).unwrap().unwrap();
        assert_eq!(by_alias.name, "Tottenham Hotspur");
        assert!(store.get_team(TeamRef::Name("chelsea")).unwrap().is_none());
    }

    #[test]
    fn player_lookup_by_id_and_name() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, _) = seed_two_teams(&store);
        let saka = store
            .insert_player(&NewPlayer {
                name: "Bukayo Saka".to_string(),
                team_id: Some(arsenal),
                position: Some("RW".to_string()),
                nationality: Some("England".to_string()),
                born: Some(date(2001, 9, 5)),
            })
            .unwrap();

        let by_id = store
            .get_player(crate::store::PlayerRef::Id(saka))
            .unwrap()
            .unwrap();
        assert_eq!(by_id.name, "Bukayo Saka");
        let by_name = store
            .get_player(crate::store::PlayerRef::Name("bukayo saka"))
            .unwrap()
            .unwrap();
        assert_eq!(by_name.team_id, Some(arsenal));
        assert!(store
            .get_player(crate::store::PlayerRef::Name("nobody"))
            .unwrap()
            .is_none());

        let hits = store.search_text(FtsDomain::Players, "saka", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, saka);
    }

    #[test]
    fn fts_search_ranks_and_escapes() {
        let store = Store::open_in_memory().unwrap();
        seed_two_teams(&store);

        let hits = store.search_text(FtsDomain::Teams, "arsenal", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].headline, "Arsenal");
        assert!(hits[0].score > 0.0);

        // Metacharacters must degrade to an empty result, not an error.
        assert!(store.search_text(FtsDomain::Teams, "\"*", 5).unwrap().is_empty());
        assert!(store.search_text(FtsDomain::Teams, "", 5).unwrap().is_empty());
        assert!(store
            .search_text(FtsDomain::Teams, "arsenal) OR (1", 5)
            .map(|hits| hits.len())
            .is_ok());
    }

    #[test]
    fn current_form_maps_results_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, spurs) = seed_two_teams(&store);

        store.insert_match(&finished(arsenal, spurs, 2, 0, date(2025, 11, 1))).unwrap();
        store.insert_match(&finished(spurs, arsenal, 1, 1, date(2025, 11, 8))).unwrap();
        store.insert_match(&finished(arsenal, spurs, 0, 3, date(2025, 11, 15))).unwrap();

        let form = store.current_form(arsenal, 5).unwrap();
        assert_eq!(form.as_str(), "LDW--");
        assert_eq!(store.current_form(9999, 5).unwrap().as_str(), "-----");
    }

    #[test]
    fn list_matches_respects_filters_and_order() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, spurs) = seed_two_teams(&store);
        store.insert_match(&finished(arsenal, spurs, 2, 0, date(2025, 11, 1))).unwrap();
        store
            .insert_match(&NewMatch {
                date: date(2025, 12, 24),
                home_team_id: spurs,
                away_team_id: arsenal,
                home_score: None,
                away_score: None,
                status: MatchStatus::Scheduled,
                competition: None,
                venue: None,
                events: vec![],
            })
            .unwrap();

        let fixtures = store
            .list_matches(&MatchFilter {
                team_id: Some(arsenal),
                status: Some(MatchStatus::Scheduled),
                ..MatchFilter::default()
            })
            .unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].date, date(2025, 12, 24));

        let none = store
            .list_matches(&MatchFilter {
                date_from: Some(date(2026, 1, 1)),
                ..MatchFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn match_lookup_round_trips_events_and_status() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, spurs) = seed_two_teams(&store);
        let mut record = finished(arsenal, spurs, 2, 0, date(2025, 11, 1));
        record.events = vec!["12' Saka".to_string(), "77' Rice".to_string()];
        let id = store.insert_match(&record).unwrap();

        let loaded = store.get_match(id).unwrap().unwrap();
        assert_eq!(loaded.status, MatchStatus::Finished);
        assert_eq!(loaded.events, vec!["12' Saka", "77' Rice"]);
        assert!(store.get_match(9999).unwrap().is_none());
    }

    #[test]
    fn transfers_filter_by_team_and_window() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, spurs) = seed_two_teams(&store);
        let player = store
            .insert_player(&NewPlayer {
                name: "New Signing".to_string(),
                team_id: Some(arsenal),
                ..NewPlayer::default()
            })
            .unwrap();
        let recent = chrono::Utc::now().date_naive();
        let ancient = date(2015, 7, 1);
        store
            .insert_transfer(player, Some(spurs), Some(arsenal), TransferKind::Permanent, Some("£60m"), recent)
            .unwrap();
        store
            .insert_transfer(player, None, Some(arsenal), TransferKind::Free, None, ancient)
            .unwrap();

        let windowed = store.get_transfers(Some(arsenal), Some(6)).unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].fee.as_deref(), Some("£60m"));

        let all = store.get_transfers(Some(arsenal), None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.get_transfers(Some(spurs), Some(6)).unwrap().len() == 1);
    }

    #[test]
    fn latest_season_orders_lexicographically() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, _) = seed_two_teams(&store);
        for season in ["2023-24", "2025-26", "2024-25"] {
            store
                .upsert_standing(&StandingRow {
                    team_id: arsenal,
                    league: "Premier League".to_string(),
                    season: season.to_string(),
                    position: 1,
                    played: 0,
                    won: 0,
                    drawn: 0,
                    lost: 0,
                    goals_for: 0,
                    goals_against: 0,
                    points: 0,
                    form: FormString::empty(),
                })
                .unwrap();
        }
        assert_eq!(
            store.latest_season("Premier League").unwrap().as_deref(),
            Some("2025-26")
        );
        assert_eq!(store.latest_season("Serie A").unwrap(), None);
    }

    #[test]
    fn graph_traversal_is_bounded_and_cascades_on_delete() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, spurs) = seed_two_teams(&store);

        let arsenal_node = store
            .insert_node(&NewNode {
                kind: NodeKind::Team,
                entity_id: Some(arsenal),
                name: "Arsenal".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let spurs_node = store
            .insert_node(&NewNode {
                kind: NodeKind::Team,
                entity_id: Some(spurs),
                name: "Tottenham Hotspur".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        let henry = store
            .insert_node(&NewNode {
                kind: NodeKind::Legend,
                entity_id: None,
                name: "Thierry Henry".to_string(),
                properties: serde_json::json!({"era": "1999-2007"}),
            })
            .unwrap();

        store
            .insert_edge(&NewEdge {
                source: arsenal_node,
                target: spurs_node,
                relation: Relation::RivalOf,
                weight: 1.0,
                properties: serde_json::json!({"intensity": 10}),
            })
            .unwrap();
        store
            .insert_edge(&NewEdge {
                source: henry,
                target: arsenal_node,
                relation: Relation::LegendaryAt,
                weight: 0.9,
                properties: serde_json::json!({}),
            })
            .unwrap();

        let depth_one = store.graph_neighbors(arsenal_node, None, 1).unwrap();
        assert_eq!(depth_one.len(), 2);
        assert!(depth_one.iter().all(|hop| hop.depth == 1));

        // Depth 2 from the legend reaches the rival through the team, and
        // never revisits a node.
        let depth_two = store.graph_neighbors(henry, None, 2).unwrap();
        let names: Vec<&str> = depth_two.iter().map(|hop| hop.to.name.as_str()).collect();
        assert_eq!(names, vec!["Arsenal", "Tottenham Hotspur"]);

        assert!(store.delete_node(spurs_node).unwrap());
        assert!(store.get_node(spurs_node).unwrap().is_none());
        assert_eq!(store.get_node(henry).unwrap().unwrap().name, "Thierry Henry");
        let after = store.graph_neighbors(arsenal_node, None, 2).unwrap();
        assert_eq!(after.len(), 1, "edge to the deleted node must cascade away");
    }

    #[test]
    fn persona_bundle_round_trips_in_one_read() {
        let store = Store::open_in_memory().unwrap();
        let (arsenal, _) = seed_two_teams(&store);

        let mut substitutions = BTreeMap::new();
        substitutions.insert("Tottenham".to_string(), "that lot".to_string());
        let mut forbidden = BTreeSet::new();
        forbidden.insert("2006 final".to_string());

        store
            .insert_persona(&PersonaIdentity {
                team_id: arsenal,
                nickname: "Gooner".to_string(),
                motto: "Victoria Concordia Crescit".to_string(),
                core_values: vec!["beautiful football".to_string()],
                vocabulary: VocabularyRules {
                    substitutions,
                    forbidden_topics: forbidden,
                },
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
                    summary: "Record scorer, statue outside the ground.".to_string(),
                }],
                moments: vec![MomentSummary {
                    title: "The Invincibles".to_string(),
                    date: Some(date(2004, 5, 15)),
                    opponent: None,
                    summary: "Unbeaten league season.".to_string(),
                }],
            })
            .unwrap();

        let bundle = store.load_persona(arsenal).unwrap().unwrap();
        assert_eq!(bundle.nickname, "Gooner");
        assert_eq!(bundle.rivals.len(), 1);
        assert_eq!(bundle.rivals[0].intensity, 10);
        assert_eq!(bundle.legends[0].name, "Thierry Henry");
        assert_eq!(bundle.moments[0].title, "The Invincibles");
        assert_eq!(
            bundle.vocabulary.substitutions.get("Tottenham").map(String::as_str),
            Some("that lot")
        );
        assert!(store.load_persona(424242).unwrap().is_none());
        assert_eq!(store.list_legend_names().unwrap(), vec!["Thierry Henry"]);
    }

    #[test]
    fn data_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrace.db");
        {
            let store = Store::open(&path).unwrap();
            seed_two_teams(&store);
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.list_teams().unwrap().len(), 2);
        let hits = reopened.search_text(FtsDomain::Teams, "emirates", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn session_state_and_security_log_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let row = SessionStateRow {
            session_id: "sess-1".to_string(),
            level: 2,
            clean_streak: 3,
            strike_count: 4,
            last_attempt_at: Some(chrono::Utc::now()),
        };
        store.upsert_session_state(&row).unwrap();
        let loaded = store.get_session_state("sess-1").unwrap().unwrap();
        assert_eq!(loaded.level, 2);
        assert_eq!(loaded.clean_streak, 3);

        store
            .append_security_log(&SecurityLogEntry {
                session_id: "sess-1".to_string(),
                at: chrono::Utc::now(),
                pattern: "instruction_override".to_string(),
                input_len: 42,
                response_class: "deflected".to_string(),
            })
            .unwrap();
        let log = store.list_security_log("sess-1").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].input_len, 42);
    }
}
