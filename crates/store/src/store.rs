//! SQLite-backed knowledge store.
//!
//! One connection behind a mutex; WAL mode keeps concurrent readers cheap.
//! Every multi-row aggregate (persona bundle, graph traversal) is assembled
//! under a single lock acquisition so callers never observe partial state.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Months, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::fts::{escape_match_query, FtsDomain};
use crate::schema;
use crate::types::*;

/// A ranked full-text hit, ready for fusion.
#[derive(Debug, Clone)]
pub struct TextHit {
    pub domain: FtsDomain,
    pub entity_id: i64,
    pub headline: String,
    pub detail: String,
    /// Positive relevance; negated FTS5 bm25 rank, larger is better.
    pub score: f64,
}

/// One traversal step: `from` --edge--> `to`, discovered at `depth`.
#[derive(Debug, Clone)]
pub struct GraphHop {
    pub from: GraphNode,
    pub edge: GraphEdge,
    pub to: GraphNode,
    pub depth: u8,
}

#[derive(Debug, Clone, Copy)]
pub enum TeamRef<'a> {
    Id(i64),
    Name(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub enum PlayerRef<'a> {
    Id(i64),
    Name(&'a str),
}

#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub team_id: Option<i64>,
    pub status: Option<MatchStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
    /// Date-descending when set; the default scan is chronological.
    pub newest_first: bool,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database. Handy for tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    // ── Full-text search ─────────────────────────────────────────────────────

    /// BM25-ranked full-text match over one corpus. Empty or
    /// metacharacter-only queries return an empty list, never an error.
    pub fn search_text(&self, domain: FtsDomain, query: &str, limit: usize) -> Result<Vec<TextHit>> {
        let Some(escaped) = escape_match_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let sql = match domain {
            FtsDomain::Teams => {
                "SELECT team_id, name, league || ', ' || coalesce(stadium, 'unknown ground'), rank \
                 FROM fts_teams WHERE fts_teams MATCH ?1 ORDER BY rank LIMIT ?2"
            }
            FtsDomain::Players => {
                "SELECT player_id, name, coalesce(position, '') || ' ' || coalesce(nationality, ''), rank \
                 FROM fts_players WHERE fts_players MATCH ?1 ORDER BY rank LIMIT ?2"
            }
            FtsDomain::News => {
                "SELECT news_id, title, substr(body, 1, 160), rank \
                 FROM fts_news WHERE fts_news MATCH ?1 ORDER BY rank LIMIT ?2"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let hits = stmt
            .query_map(params![escaped, limit as i64], |row| {
                Ok(TextHit {
                    domain,
                    entity_id: row.get(0)?,
                    headline: row.get(1)?,
                    detail: row.get::<_, String>(2)?.trim().to_string(),
                    score: -row.get::<_, f64>(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(domain = domain.as_str(), hits = hits.len(), "fts search");
        Ok(hits)
    }

    // ── Single-record lookups ────────────────────────────────────────────────

    pub fn get_team(&self, team: TeamRef<'_>) -> Result<Option<Team>> {
        let conn = self.lock()?;
        match team {
            TeamRef::Id(id) => {
                let row = conn
                    .query_row(
                        "SELECT id, name, short_name, league, founded, stadium, aliases \
                         FROM team WHERE id = ?1",
                        params![id],
                        map_team,
                    )
                    .optional()?;
                Ok(row)
            }
            TeamRef::Name(name) => {
                let row = conn
                    .query_row(
                        "SELECT id, name, short_name, league, founded, stadium, aliases \
                         FROM team WHERE lower(name) = lower(?1) OR lower(short_name) = lower(?1)",
                        params![name],
                        map_team,
                    )
                    .optional()?;
                if row.is_some() {
                    return Ok(row);
                }
                // Aliases live in a JSON column; scan them in-process.
                let mut stmt = conn.prepare(
                    "SELECT id, name, short_name, league, founded, stadium, aliases FROM team",
                )?;
                let teams = stmt
                    .query_map([], map_team)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(teams.into_iter().find(|t| {
                    t.aliases
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(name))
                }))
            }
        }
    }

    pub fn get_player(&self, player: PlayerRef<'_>) -> Result<Option<Player>> {
        let conn = self.lock()?;
        let row = match player {
            PlayerRef::Id(id) => conn
                .query_row(
                    "SELECT id, name, team_id, position, nationality, born \
                     FROM player WHERE id = ?1",
                    params![id],
                    map_player,
                )
                .optional()?,
            PlayerRef::Name(name) => conn
                .query_row(
                    "SELECT id, name, team_id, position, nationality, born \
                     FROM player WHERE lower(name) = lower(?1)",
                    params![name],
                    map_player,
                )
                .optional()?,
        };
        Ok(row)
    }

    pub fn get_match(&self, id: i64) -> Result<Option<MatchRecord>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, date, home_team_id, away_team_id, home_score, away_score, \
                        status, competition, venue, events \
                 FROM matches WHERE id = ?1",
                params![id],
                map_match,
            )
            .optional()?)
    }

    // ── Filtered scans ───────────────────────────────────────────────────────

    pub fn list_matches(&self, filter: &MatchFilter) -> Result<Vec<MatchRecord>> {
        let conn = self.lock()?;
        list_matches_on(&conn, filter)
    }

    pub fn get_standings(&self, league: &str, season: &str) -> Result<Vec<StandingRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT team_id, league, season, position, played, won, drawn, lost, \
                    goals_for, goals_against, points, form \
             FROM standing WHERE league = ?1 AND season = ?2 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![league, season], |row| {
                Ok(StandingRow {
                    team_id: row.get(0)?,
                    league: row.get(1)?,
                    season: row.get(2)?,
                    position: row.get(3)?,
                    played: row.get(4)?,
                    won: row.get(5)?,
                    drawn: row.get(6)?,
                    lost: row.get(7)?,
                    goals_for: row.get(8)?,
                    goals_against: row.get(9)?,
                    points: row.get(10)?,
                    form: FormString::parse(&row.get::<_, String>(11)?)
                        .unwrap_or_else(|_| FormString::empty()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent season recorded for a league, by string ordering
    /// ("2025-26" sorts above "2024-25").
    pub fn latest_season(&self, league: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT max(season) FROM standing WHERE league = ?1",
                params![league],
                |row| row.get(0),
            )
            .optional()?
            .flatten())
    }

    pub fn get_injuries(&self, team_id: Option<i64>, status: InjuryStatus) -> Result<Vec<Injury>> {
        let conn = self.lock()?;
        let sql = "SELECT i.id, i.player_id, p.name, i.kind, i.severity, i.expected_return, i.status \
                   FROM injury i JOIN player p ON p.id = i.player_id \
                   WHERE i.status = ?1 AND (?2 IS NULL OR p.team_id = ?2) \
                   ORDER BY i.id";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![status.as_str(), team_id], |row| {
                Ok(Injury {
                    id: row.get(0)?,
                    player_id: row.get(1)?,
                    player_name: row.get(2)?,
                    kind: row.get(3)?,
                    severity: row.get(4)?,
                    expected_return: row.get(5)?,
                    status: InjuryStatus::parse(&row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_transfers(
        &self,
        team_id: Option<i64>,
        window_months: Option<u32>,
    ) -> Result<Vec<Transfer>> {
        let cutoff = window_months.and_then(|months| {
            Utc::now()
                .date_naive()
                .checked_sub_months(Months::new(months))
        });
        let conn = self.lock()?;
        let sql = "SELECT t.id, t.player_id, p.name, t.from_team_id, t.to_team_id, t.kind, t.fee, t.effective \
                   FROM transfer t JOIN player p ON p.id = t.player_id \
                   WHERE (?1 IS NULL OR t.from_team_id = ?1 OR t.to_team_id = ?1) \
                     AND (?2 IS NULL OR t.effective >= ?2) \
                   ORDER BY t.effective DESC";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![team_id, cutoff], |row| {
                Ok(Transfer {
                    id: row.get(0)?,
                    player_id: row.get(1)?,
                    player_name: row.get(2)?,
                    from_team_id: row.get(3)?,
                    to_team_id: row.get(4)?,
                    kind: TransferKind::parse(&row.get::<_, String>(5)?)
                        .unwrap_or(TransferKind::Permanent),
                    fee: row.get(6)?,
                    effective: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Knowledge graph ──────────────────────────────────────────────────────

    /// Breadth-first neighborhood of `node_id`, depth capped at 2. A node is
    /// visited at most once per traversal; `relations = None` follows the
    /// default traversal set.
    pub fn graph_neighbors(
        &self,
        node_id: i64,
        relations: Option<&[Relation]>,
        depth: u8,
    ) -> Result<Vec<GraphHop>> {
        let default_set;
        let allowed: HashSet<&str> = match relations {
            Some(given) => given.iter().map(|r| r.as_str()).collect(),
            None => {
                default_set = Relation::traversal_set();
                default_set.iter().map(|r| r.as_str()).collect()
            }
        };

        let conn = self.lock()?;
        let mut visited: HashSet<i64> = HashSet::from([node_id]);
        let mut frontier = vec![node_id];
        let mut hops = Vec::new();

        for level in 1..=depth.min(2) {
            let mut next = Vec::new();
            for &from_id in &frontier {
                for edge in edges_touching(&conn, from_id)? {
                    if !allowed.contains(edge.relation.as_str()) {
                        continue;
                    }
                    let other = if edge.source == from_id {
                        edge.target
                    } else {
                        edge.source
                    };
                    if !visited.insert(other) {
                        continue;
                    }
                    let (Some(from), Some(to)) =
                        (get_node_on(&conn, from_id)?, get_node_on(&conn, other)?)
                    else {
                        continue;
                    };
                    next.push(other);
                    hops.push(GraphHop {
                        from,
                        edge,
                        to,
                        depth: level,
                    });
                }
            }
            frontier = next;
        }
        Ok(hops)
    }

    /// Case-insensitive substring match over node names; traversal seeds.
    pub fn search_graph_by_name(&self, query: &str) -> Result<Vec<GraphNode>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, entity_id, name, properties FROM kg_node \
             WHERE name LIKE '%' || ?1 || '%' COLLATE NOCASE ORDER BY id",
        )?;
        let nodes = stmt
            .query_map(params![trimmed], map_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// The graph node standing for a team, when one was ingested.
    pub fn team_node(&self, team_id: i64) -> Result<Option<GraphNode>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, kind, entity_id, name, properties FROM kg_node \
                 WHERE kind = 'team' AND entity_id = ?1",
                params![team_id],
                map_node,
            )
            .optional()?)
    }

    pub fn get_node(&self, id: i64) -> Result<Option<GraphNode>> {
        let conn = self.lock()?;
        get_node_on(&conn, id)
    }

    // ── Persona bundle ───────────────────────────────────────────────────────

    /// Assemble the full per-identity bundle in one lock acquisition.
    pub fn load_persona(&self, team_id: i64) -> Result<Option<PersonaIdentity>> {
        let conn = self.lock()?;
        let base = conn
            .query_row(
                "SELECT nickname, motto, core_values, substitutions, forbidden_topics, baseline \
                 FROM persona WHERE team_id = ?1",
                params![team_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((nickname, motto, core_values, substitutions, forbidden, baseline)) = base else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT name, intensity, origin, banter FROM persona_rival \
             WHERE team_id = ?1 ORDER BY intensity DESC",
        )?;
        let rivals = stmt
            .query_map(params![team_id], |row| {
                Ok(RivalSummary {
                    name: row.get(0)?,
                    intensity: row.get::<_, i64>(1)?.clamp(1, 10) as u8,
                    origin: row.get(2)?,
                    banter: parse_json_list(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT name, era, summary FROM persona_legend WHERE team_id = ?1 ORDER BY name",
        )?;
        let legends = stmt
            .query_map(params![team_id], |row| {
                Ok(LegendSummary {
                    name: row.get(0)?,
                    era: row.get(1)?,
                    summary: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT title, date, opponent, summary FROM persona_moment \
             WHERE team_id = ?1 ORDER BY date",
        )?;
        let moments = stmt
            .query_map(params![team_id], |row| {
                Ok(MomentSummary {
                    title: row.get(0)?,
                    date: row.get(1)?,
                    opponent: row.get(2)?,
                    summary: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(PersonaIdentity {
            team_id,
            nickname,
            motto,
            core_values: parse_json_list(&core_values),
            vocabulary: VocabularyRules {
                substitutions: serde_json::from_str(&substitutions).unwrap_or_default(),
                forbidden_topics: serde_json::from_str(&forbidden).unwrap_or_default(),
            },
            baseline,
            rivals,
            legends,
            moments,
        }))
    }

    // ── Derived form ─────────────────────────────────────────────────────────

    /// Form over the team's last `last_n` finished matches, newest first,
    /// padded with `-` when fewer exist.
    pub fn current_form(&self, team_id: i64, last_n: usize) -> Result<FormString> {
        let filter = MatchFilter {
            team_id: Some(team_id),
            status: Some(MatchStatus::Finished),
            limit: Some(last_n.min(FormString::LEN)),
            newest_first: true,
            ..MatchFilter::default()
        };
        let conn = self.lock()?;
        let matches = list_matches_on(&conn, &filter)?;
        let outcomes: Vec<char> = matches
            .iter()
            .filter_map(|m| m.outcome_for(team_id))
            .collect();
        Ok(FormString::from_outcomes(&outcomes))
    }

    // ── Dictionary feeds ─────────────────────────────────────────────────────

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, short_name, league, founded, stadium, aliases FROM team ORDER BY id",
        )?;
        let teams = stmt
            .query_map([], map_team)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    pub fn list_players(&self) -> Result<Vec<Player>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, team_id, position, nationality, born FROM player ORDER BY id",
        )?;
        let players = stmt
            .query_map([], map_player)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(players)
    }

    /// Legend names across all persona bundles, for entity recognition.
    pub fn list_legend_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT name FROM persona_legend ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    // ── Bounded writes ───────────────────────────────────────────────────────

    pub fn append_security_log(&self, entry: &SecurityLogEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO security_log (session_id, at, pattern, input_len, response_class) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.session_id,
                entry.at,
                entry.pattern,
                entry.input_len as i64,
                entry.response_class,
            ],
        )?;
        Ok(())
    }

    pub fn list_security_log(&self, session_id: &str) -> Result<Vec<SecurityLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, at, pattern, input_len, response_class \
             FROM security_log WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(SecurityLogEntry {
                    session_id: row.get(0)?,
                    at: row.get(1)?,
                    pattern: row.get(2)?,
                    input_len: row.get::<_, i64>(3)?.max(0) as usize,
                    response_class: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert_session_state(&self, row: &SessionStateRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_state (session_id, level, clean_streak, strike_count, last_attempt_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(session_id) DO UPDATE SET \
                level = excluded.level, \
                clean_streak = excluded.clean_streak, \
                strike_count = excluded.strike_count, \
                last_attempt_at = excluded.last_attempt_at",
            params![
                row.session_id,
                row.level as i64,
                row.clean_streak as i64,
                row.strike_count as i64,
                row.last_attempt_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_session_state(&self, session_id: &str) -> Result<Option<SessionStateRow>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT session_id, level, clean_streak, strike_count, last_attempt_at \
                 FROM session_state WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionStateRow {
                        session_id: row.get(0)?,
                        level: row.get::<_, i64>(1)?.clamp(0, 4) as u8,
                        clean_streak: row.get::<_, i64>(2)?.max(0) as u32,
                        strike_count: row.get::<_, i64>(3)?.max(0) as u32,
                        last_attempt_at: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn append_analytics(&self, record: &AnalyticsRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO analytics (at, conversation_id, persona_id, intent, source_count, \
                                    confidence, latency_ms, cache_hit, cancelled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.at,
                record.conversation_id,
                record.persona_id,
                record.intent,
                record.source_count as i64,
                record.confidence,
                record.latency_ms as i64,
                record.cache_hit,
                record.cancelled,
            ],
        )?;
        Ok(())
    }

    pub fn recent_analytics(&self, limit: usize) -> Result<Vec<AnalyticsRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT at, conversation_id, persona_id, intent, source_count, confidence, \
                    latency_ms, cache_hit, cancelled \
             FROM analytics ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AnalyticsRecord {
                    at: row.get::<_, DateTime<Utc>>(0)?,
                    conversation_id: row.get(1)?,
                    persona_id: row.get(2)?,
                    intent: row.get(3)?,
                    source_count: row.get::<_, i64>(4)?.max(0) as usize,
                    confidence: row.get(5)?,
                    latency_ms: row.get::<_, i64>(6)?.max(0) as u64,
                    cache_hit: row.get(7)?,
                    cancelled: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ── Row mappers & per-connection helpers ──────────────────────────────────────

fn map_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        league: row.get(3)?,
        founded: row.get(4)?,
        stadium: row.get(5)?,
        aliases: parse_json_list(&row.get::<_, String>(6)?),
    })
}

fn map_player(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        team_id: row.get(2)?,
        position: row.get(3)?,
        nationality: row.get(4)?,
        born: row.get(5)?,
    })
}

fn map_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRecord> {
    Ok(MatchRecord {
        id: row.get(0)?,
        date: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        home_score: row.get(4)?,
        away_score: row.get(5)?,
        status: MatchStatus::parse(&row.get::<_, String>(6)?).unwrap_or(MatchStatus::Scheduled),
        competition: row.get(7)?,
        venue: row.get(8)?,
        events: parse_json_list(&row.get::<_, String>(9)?),
    })
}

fn map_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphNode> {
    Ok(GraphNode {
        id: row.get(0)?,
        kind: NodeKind::parse(&row.get::<_, String>(1)?),
        entity_id: row.get(2)?,
        name: row.get(3)?,
        properties: parse_json_map(&row.get::<_, String>(4)?),
    })
}

fn map_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEdge> {
    Ok(GraphEdge {
        id: row.get(0)?,
        source: row.get(1)?,
        target: row.get(2)?,
        relation: Relation::parse(&row.get::<_, String>(3)?),
        weight: row.get::<_, f64>(4)?.clamp(0.0, 1.0),
        properties: parse_json_map(&row.get::<_, String>(5)?),
    })
}

fn get_node_on(conn: &Connection, id: i64) -> Result<Option<GraphNode>> {
    Ok(conn
        .query_row(
            "SELECT id, kind, entity_id, name, properties FROM kg_node WHERE id = ?1",
            params![id],
            map_node,
        )
        .optional()?)
}

fn edges_touching(conn: &Connection, node_id: i64) -> Result<Vec<GraphEdge>> {
    let mut stmt = conn.prepare(
        "SELECT id, source, target, relation, weight, properties FROM kg_edge \
         WHERE source = ?1 OR target = ?1 ORDER BY weight DESC, id",
    )?;
    let edges = stmt
        .query_map(params![node_id], map_edge)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(edges)
}

fn list_matches_on(conn: &Connection, filter: &MatchFilter) -> Result<Vec<MatchRecord>> {
    let order = if filter.newest_first { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT id, date, home_team_id, away_team_id, home_score, away_score, \
                status, competition, venue, events \
         FROM matches \
         WHERE (?1 IS NULL OR home_team_id = ?1 OR away_team_id = ?1) \
           AND (?2 IS NULL OR status = ?2) \
           AND (?3 IS NULL OR date >= ?3) \
           AND (?4 IS NULL OR date <= ?4) \
         ORDER BY date {order}, id {order} \
         LIMIT ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let limit = filter.limit.map(|n| n as i64).unwrap_or(-1);
    let rows = stmt
        .query_map(
            params![
                filter.team_id,
                filter.status.map(MatchStatus::as_str),
                filter.date_from,
                filter.date_to,
                limit,
            ],
            map_match,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_json_map(raw: &str) -> BTreeMap<String, serde_json::Value> {
    serde_json::from_str(raw).unwrap_or_default()
}
