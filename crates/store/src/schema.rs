//! SQLite schema. Applied idempotently on open.

use rusqlite::Connection;

use crate::error::StoreError;

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS team (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    short_name  TEXT NOT NULL,
    league      TEXT NOT NULL,
    founded     INTEGER,
    stadium     TEXT,
    aliases     TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS player (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    team_id     INTEGER REFERENCES team(id),
    position    TEXT,
    nationality TEXT,
    born        TEXT
);
CREATE INDEX IF NOT EXISTS idx_player_team ON player(team_id);

CREATE TABLE IF NOT EXISTS matches (
    id            INTEGER PRIMARY KEY,
    date          TEXT NOT NULL,
    home_team_id  INTEGER NOT NULL REFERENCES team(id),
    away_team_id  INTEGER NOT NULL REFERENCES team(id),
    home_score    INTEGER,
    away_score    INTEGER,
    status        TEXT NOT NULL DEFAULT 'scheduled',
    competition   TEXT,
    venue         TEXT,
    events        TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date);
CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_team_id, date);
CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_team_id, date);

CREATE TABLE IF NOT EXISTS standing (
    team_id       INTEGER NOT NULL REFERENCES team(id),
    league        TEXT NOT NULL,
    season        TEXT NOT NULL,
    position      INTEGER NOT NULL,
    played        INTEGER NOT NULL DEFAULT 0,
    won           INTEGER NOT NULL DEFAULT 0,
    drawn         INTEGER NOT NULL DEFAULT 0,
    lost          INTEGER NOT NULL DEFAULT 0,
    goals_for     INTEGER NOT NULL DEFAULT 0,
    goals_against INTEGER NOT NULL DEFAULT 0,
    points        INTEGER NOT NULL DEFAULT 0,
    form          TEXT NOT NULL DEFAULT '-----',
    PRIMARY KEY (team_id, league, season)
);

CREATE TABLE IF NOT EXISTS injury (
    id              INTEGER PRIMARY KEY,
    player_id       INTEGER NOT NULL REFERENCES player(id),
    kind            TEXT NOT NULL,
    severity        TEXT,
    expected_return TEXT,
    status          TEXT NOT NULL DEFAULT 'active'
);
CREATE INDEX IF NOT EXISTS idx_injury_player ON injury(player_id, status);

CREATE TABLE IF NOT EXISTS transfer (
    id           INTEGER PRIMARY KEY,
    player_id    INTEGER NOT NULL REFERENCES player(id),
    from_team_id INTEGER REFERENCES team(id),
    to_team_id   INTEGER REFERENCES team(id),
    kind         TEXT NOT NULL DEFAULT 'permanent',
    fee          TEXT,
    effective    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transfer_effective ON transfer(effective);

CREATE TABLE IF NOT EXISTS news (
    id        INTEGER PRIMARY KEY,
    title     TEXT NOT NULL,
    body      TEXT NOT NULL,
    published TEXT NOT NULL,
    team_id   INTEGER REFERENCES team(id)
);

CREATE TABLE IF NOT EXISTS kg_node (
    id         INTEGER PRIMARY KEY,
    kind       TEXT NOT NULL,
    entity_id  INTEGER,
    name       TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_kg_node_name ON kg_node(name);

CREATE TABLE IF NOT EXISTS kg_edge (
    id         INTEGER PRIMARY KEY,
    source     INTEGER NOT NULL REFERENCES kg_node(id) ON DELETE CASCADE,
    target     INTEGER NOT NULL REFERENCES kg_node(id) ON DELETE CASCADE,
    relation   TEXT NOT NULL,
    weight     REAL NOT NULL DEFAULT 1.0,
    properties TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_kg_edge_source ON kg_edge(source);
CREATE INDEX IF NOT EXISTS idx_kg_edge_target ON kg_edge(target);

CREATE TABLE IF NOT EXISTS persona (
    team_id          INTEGER PRIMARY KEY REFERENCES team(id),
    nickname         TEXT NOT NULL,
    motto            TEXT NOT NULL DEFAULT '',
    core_values      TEXT NOT NULL DEFAULT '[]',
    substitutions    TEXT NOT NULL DEFAULT '{}',
    forbidden_topics TEXT NOT NULL DEFAULT '[]',
    baseline         TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS persona_rival (
    team_id   INTEGER NOT NULL REFERENCES persona(team_id) ON DELETE CASCADE,
    name      TEXT NOT NULL,
    intensity INTEGER NOT NULL DEFAULT 5,
    origin    TEXT NOT NULL DEFAULT '',
    banter    TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_persona_rival ON persona_rival(team_id);

CREATE TABLE IF NOT EXISTS persona_legend (
    team_id INTEGER NOT NULL REFERENCES persona(team_id) ON DELETE CASCADE,
    name    TEXT NOT NULL,
    era     TEXT,
    summary TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_persona_legend ON persona_legend(team_id);

CREATE TABLE IF NOT EXISTS persona_moment (
    team_id  INTEGER NOT NULL REFERENCES persona(team_id) ON DELETE CASCADE,
    title    TEXT NOT NULL,
    date     TEXT,
    opponent TEXT,
    summary  TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_persona_moment ON persona_moment(team_id);

CREATE TABLE IF NOT EXISTS session_state (
    session_id      TEXT PRIMARY KEY,
    level           INTEGER NOT NULL DEFAULT 0,
    clean_streak    INTEGER NOT NULL DEFAULT 0,
    strike_count    INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT
);

CREATE TABLE IF NOT EXISTS security_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id     TEXT NOT NULL,
    at             TEXT NOT NULL,
    pattern        TEXT NOT NULL,
    input_len      INTEGER NOT NULL,
    response_class TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_security_log_session ON security_log(session_id);

CREATE TABLE IF NOT EXISTS analytics (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    at              TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    persona_id      TEXT,
    intent          TEXT,
    source_count    INTEGER NOT NULL DEFAULT 0,
    confidence      REAL NOT NULL DEFAULT 0,
    latency_ms      INTEGER NOT NULL DEFAULT 0,
    cache_hit       INTEGER NOT NULL DEFAULT 0,
    cancelled       INTEGER NOT NULL DEFAULT 0
);
";

/// FTS5 virtual tables are created one-by-one through the query path:
/// CREATE VIRTUAL TABLE can return SQLITE_ROW under some bundled
/// configurations, which the plain execute path rejects.
const FTS_TABLES: &[&str] = &[
    "CREATE VIRTUAL TABLE IF NOT EXISTS fts_teams USING fts5(\
        team_id UNINDEXED, name, short_name, league, stadium)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS fts_players USING fts5(\
        player_id UNINDEXED, name, position, nationality)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS fts_news USING fts5(\
        news_id UNINDEXED, title, body)",
];

pub(crate) fn apply(conn: &Connection) -> Result<(), StoreError> {
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.query_row("PRAGMA busy_timeout=5000", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    conn.execute_batch(TABLES)?;
    for ddl in FTS_TABLES {
        let mut stmt = conn.prepare(ddl)?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
    }
    Ok(())
}
