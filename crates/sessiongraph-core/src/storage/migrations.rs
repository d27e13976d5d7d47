//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: nodes, child tables, edges, FTS5, embeddings",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "node_embeddings_vec vec0 virtual table for kNN search",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: nodes + child tables + edges + FTS5
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    previous_versions TEXT NOT NULL DEFAULT '[]',

    session_file TEXT NOT NULL,
    segment_start TEXT NOT NULL,
    segment_end TEXT NOT NULL,
    entry_count INTEGER NOT NULL DEFAULT 0,
    computer TEXT NOT NULL DEFAULT '',
    session_id TEXT NOT NULL DEFAULT '',
    parent_session TEXT,

    type TEXT NOT NULL DEFAULT 'other',
    project TEXT NOT NULL DEFAULT '',
    is_new_project INTEGER NOT NULL DEFAULT 0,
    had_clear_goal INTEGER NOT NULL DEFAULT 0,
    language TEXT,
    frameworks TEXT NOT NULL DEFAULT '[]',

    summary TEXT NOT NULL DEFAULT '',
    outcome TEXT NOT NULL DEFAULT 'abandoned',
    key_decisions TEXT NOT NULL DEFAULT '[]',
    files_touched TEXT NOT NULL DEFAULT '[]',
    tools_used TEXT NOT NULL DEFAULT '[]',
    errors_seen TEXT NOT NULL DEFAULT '[]',

    models_used TEXT NOT NULL DEFAULT '[]',
    prompting_wins TEXT NOT NULL DEFAULT '[]',
    prompting_failures TEXT NOT NULL DEFAULT '[]',

    tokens_used INTEGER NOT NULL DEFAULT 0,
    cost REAL NOT NULL DEFAULT 0.0,
    duration_minutes INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL,
    analyzed_at TEXT NOT NULL,
    analyzer_version TEXT NOT NULL DEFAULT '',

    related_projects TEXT NOT NULL DEFAULT '[]',
    concepts TEXT NOT NULL DEFAULT '[]',

    rlm_used INTEGER NOT NULL DEFAULT 0,
    codemap_available INTEGER,
    analysis_log TEXT,
    segment_token_count INTEGER,

    signals TEXT,
    relevance_score REAL NOT NULL DEFAULT 1.0,
    last_accessed TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    importance REAL NOT NULL DEFAULT 0.0,

    data_file TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (id)
);

CREATE INDEX IF NOT EXISTS idx_nodes_timestamp ON nodes(timestamp);
CREATE INDEX IF NOT EXISTS idx_nodes_project ON nodes(project);
CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
CREATE INDEX IF NOT EXISTS idx_nodes_outcome ON nodes(outcome);
CREATE INDEX IF NOT EXISTS idx_nodes_session_file ON nodes(session_file);
CREATE INDEX IF NOT EXISTS idx_nodes_computer ON nodes(computer);

CREATE TABLE IF NOT EXISTS tags (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (node_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);

CREATE TABLE IF NOT EXISTS topics (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    topic TEXT NOT NULL,
    PRIMARY KEY (node_id, topic)
);
CREATE INDEX IF NOT EXISTS idx_topics_topic ON topics(topic);

CREATE TABLE IF NOT EXISTS lessons (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    level TEXT NOT NULL DEFAULT 'task',
    summary TEXT NOT NULL DEFAULT '',
    details TEXT NOT NULL DEFAULT '',
    confidence TEXT NOT NULL DEFAULT 'low',
    actionable INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_lessons_node ON lessons(node_id);
CREATE INDEX IF NOT EXISTS idx_lessons_level ON lessons(level);
CREATE INDEX IF NOT EXISTS idx_lessons_created ON lessons(created_at);

CREATE TABLE IF NOT EXISTS lesson_tags (
    lesson_id TEXT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (lesson_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_lesson_tags_tag ON lesson_tags(tag);

CREATE TABLE IF NOT EXISTS model_quirks (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    model TEXT NOT NULL DEFAULT '',
    observation TEXT NOT NULL DEFAULT '',
    frequency TEXT NOT NULL DEFAULT 'once',
    workaround TEXT,
    severity TEXT NOT NULL DEFAULT 'low',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_quirks_model ON model_quirks(model);
CREATE INDEX IF NOT EXISTS idx_quirks_node ON model_quirks(node_id);

CREATE TABLE IF NOT EXISTS tool_errors (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    tool TEXT NOT NULL DEFAULT '',
    error_type TEXT NOT NULL DEFAULT '',
    context TEXT NOT NULL DEFAULT '',
    model TEXT,
    was_retried INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tool_errors_tool ON tool_errors(tool);
CREATE INDEX IF NOT EXISTS idx_tool_errors_node ON tool_errors(node_id);
CREATE INDEX IF NOT EXISTS idx_tool_errors_created ON tool_errors(created_at);

CREATE TABLE IF NOT EXISTS daemon_decisions (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    timestamp TEXT NOT NULL,
    decision TEXT NOT NULL DEFAULT '',
    reasoning TEXT NOT NULL DEFAULT '',
    needs_review INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_node ON daemon_decisions(node_id);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    source_node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    type TEXT NOT NULL DEFAULT 'continuation',
    metadata TEXT NOT NULL DEFAULT '{}',
    confidence REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL DEFAULT 'daemon'
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_node_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_unique ON edges(source_node_id, target_node_id, type);

-- FTS5 virtual table over summary, decisions, lessons, tags, topics. Decisions
-- and lessons are derived/concatenated text, not raw node columns, so this is
-- a standalone table kept in sync by explicit INSERT/DELETE from the storage
-- layer rather than external-content triggers.
CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
    node_id UNINDEXED,
    summary,
    decisions,
    lessons,
    tags,
    topics,
    tokenize = 'porter ascii'
);

CREATE TABLE IF NOT EXISTS node_embeddings (
    node_id TEXT PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
    model_name TEXT NOT NULL,
    dim INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    input_text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: vec0 virtual table, created separately because its dimension is a
/// run-time constant (bound at open time, not embeddable in this string).
/// The actual `CREATE VIRTUAL TABLE ... USING vec0(...)` is issued by
/// `Storage::new` once it knows the configured dimension; this migration
/// only records that the embedding feature's schema generation is at v2 so
/// `get_current_version` reports it has run.
const MIGRATION_V2_UP: &str = r#"
UPDATE schema_version SET version = 2, applied_at = datetime('now')
    WHERE version = (SELECT MAX(version) FROM schema_version);
INSERT INTO schema_version (version, applied_at)
    SELECT 2, datetime('now') WHERE NOT EXISTS (SELECT 1 FROM schema_version WHERE version = 2);
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations. Idempotent: re-running on a current database is a no-op.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );

            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

/// Create the vec0 virtual table for the configured embedding dimension.
/// Separate from `MIGRATIONS` because the dimension is a constructor
/// argument (`StorageConfig::embedding_dimensions`), not a schema constant.
pub fn ensure_vector_table(conn: &rusqlite::Connection, dimensions: usize) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS node_embeddings_vec USING vec0(
            node_id TEXT PRIMARY KEY,
            embedding FLOAT[{dimensions}]
        );"
    ))
}
