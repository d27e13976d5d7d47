//! The relational index: `Storage`, its configuration, and node CRUD.
//!
//! `Storage` pairs a versioned [`ContentStore`] on disk with a SQLite
//! relational index (nodes, edges, FTS5, the `vec0` embedding table). The
//! content store is the durable record; SQLite is a rebuildable index over
//! it — every write goes to disk first, then to SQLite, so a torn SQLite
//! write never loses data the content store doesn't also have.
//!
//! Two connections are kept open against the same database file: `writer`
//! serializes every mutation, `reader` is opened read-only so listing/search
//! queries don't queue behind an in-flight write under WAL mode. Both are
//! wrapped in a `Mutex` so `Storage` is `Send + Sync` and usable behind a
//! bare `Arc<Storage>` with no outer lock.

use crate::error::{Result, StorageError};
use crate::memory::{
    Confidence, DaemonDecisionRecord, DaemonMeta, EdgeCreator, ErrorSeen, Frequency, KeyDecision,
    Lesson, LessonLevel, ModelQuirk, ModelUsage, Node, NodeMetadata, NodeSource, NodeType, Outcome,
    Segment, Severity, ToolUseError,
};
use crate::storage::content_store::ContentStore;
use crate::storage::migrations;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub use crate::storage::filter::NodeFilters;

/// Everything needed to open a [`Storage`]. `Default` mirrors the teacher's
/// platform-directory convention (`directories::ProjectDirs`) so a caller
/// that doesn't care can just do `StorageConfig::default_paths()`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub content_root: PathBuf,
    /// Fixed embedding dimension for the `vec0` table. Every stored vector
    /// must match this exactly or the write fails with `DimensionMismatch`.
    pub embedding_dimensions: usize,
    /// Hard ceiling on any caller-supplied `limit`, independent of the
    /// per-call default (see `NodeFilters`/`ListOpts`).
    pub max_list_limit: i64,
    /// How many nodes `backfill_embeddings` embeds per `EmbeddingProvider::embed` call.
    pub backfill_batch_size: usize,
}

impl StorageConfig {
    /// Resolve the platform-default data directory (`~/.local/share/sessiongraph`
    /// on Linux, the XDG/macOS/Windows equivalents elsewhere) via `directories`.
    pub fn default_paths() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("dev", "sessiongraph", "sessiongraph")
            .ok_or_else(|| StorageError::Init("could not resolve a platform data directory".to_string()))?;
        let root = dirs.data_dir();
        Ok(Self {
            db_path: root.join("graph.sqlite3"),
            content_root: root.join("nodes"),
            embedding_dimensions: 768,
            max_list_limit: 500,
            backfill_batch_size: 32,
        })
    }
}

/// The relational index + content store. Cheap to clone behind an `Arc`;
/// expensive to construct (opens two connections, runs migrations).
pub struct Storage {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    content: ContentStore,
    config: StorageConfig,
}

/// Rollup counters for `Storage::get_stats` (SPEC_FULL §14).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub lesson_count: u64,
    pub quirk_count: u64,
    pub tool_error_count: u64,
    pub total_tokens_used: u64,
    pub total_cost: f64,
    pub project_count: u64,
    pub embedded_node_count: u64,
}

fn json_text<T: serde::Serialize>(items: &T) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

fn json_vec<T: serde::de::DeserializeOwned + Default>(s: &str) -> T {
    serde_json::from_str(s).unwrap_or_default()
}

/// Registers the `sqlite-vec` extension as an auto-extension so every
/// connection opened afterward (including `:memory:` ones) has `vec0`
/// available. `sqlite3_auto_extension` is process-global and idempotent
/// registrations are harmless, but `Once` avoids calling it on every
/// `Storage::new`.
#[cfg(feature = "embeddings")]
fn register_vec_extension() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

#[cfg(not(feature = "embeddings"))]
fn register_vec_extension() {}

impl Storage {
    /// Open (creating if absent) the database and content store at `config`'s
    /// paths, running any pending migrations.
    pub fn new(config: StorageConfig) -> Result<Self> {
        register_vec_extension();
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&config.content_root)?;

        let writer = Connection::open(&config.db_path)?;
        configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;
        migrations::ensure_vector_table(&writer, config.embedding_dimensions)?;

        let reader = Connection::open_with_flags(
            &config.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure_reader_connection(&reader)?;

        let content = ContentStore::new(config.content_root.clone());

        tracing::info!(db = %config.db_path.display(), "storage opened");

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
            content,
            config,
        })
    }

    /// Open an in-memory database, for tests and benchmarks. The content
    /// store still lives on disk at `content_root` (SQLite's `:memory:` has
    /// no filesystem analogue to borrow for that). Reads and writes share the
    /// one connection in this mode, since a second `:memory:` connection
    /// would be a distinct, empty database rather than a read-only view of
    /// the first.
    pub fn open_in_memory(content_root: impl Into<PathBuf>) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        migrations::apply_migrations(&conn)?;
        let config = StorageConfig {
            db_path: PathBuf::from(":memory:"),
            content_root: content_root.into(),
            embedding_dimensions: 768,
            max_list_limit: 500,
            backfill_batch_size: 32,
        };
        migrations::ensure_vector_table(&conn, config.embedding_dimensions)?;
        std::fs::create_dir_all(&config.content_root)?;

        let shared = Arc::new(Mutex::new(conn));
        let content = ContentStore::new(config.content_root.clone());
        Ok(Self {
            writer: Arc::clone(&shared),
            reader: shared,
            content,
            config,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub(crate) fn content_store(&self) -> &ContentStore {
        &self.content
    }

    pub(crate) fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.writer.lock()?;
        f(&conn)
    }

    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.reader.lock()?;
        f(&conn)
    }

    /// Create a brand-new node (version 1). Errors with `IdentityConflict` if
    /// `node.id` is already present under a *different* `session_file` (a
    /// genuine hash collision between two unrelated segments), or with
    /// `AlreadyExists` if it's present under the same `session_file` —
    /// re-analysis must go through `update_node`/`upsert_node` so version
    /// history stays coherent. Runs as a single transaction so the content
    /// store and relational index (parent row, FTS, child tables) never
    /// diverge on a partial failure.
    pub fn create_node(&self, node: &Node) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            if let Some(existing_session) = existing_session_file(&tx, &node.id)? {
                if existing_session != node.source.session_file {
                    return Err(StorageError::IdentityConflict {
                        id: node.id.clone(),
                        existing_session,
                        incoming_session: node.source.session_file.clone(),
                    });
                }
                return Err(StorageError::AlreadyExists(node.id.clone()));
            }
            self.content.write(node)?;
            insert_node_row(&tx, node)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Insert `node` if `node.id` doesn't exist yet, otherwise overwrite the
    /// current row and content-store record in place (same version — this is
    /// not the version-bumping reanalysis path, see `ContentStore::create_new_version`
    /// for that). Returns the stored node alongside whether it was newly
    /// created, so idempotent ingestion can tell the two cases apart
    /// without a separate existence check. Runs as a single transaction.
    pub fn upsert_node(&self, node: &Node) -> Result<(Node, bool)> {
        let created = self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            self.content.write(node)?;
            let existed = node_exists(&tx, &node.id)?;
            if existed {
                delete_child_rows(&tx, &node.id)?;
                tx.execute("DELETE FROM nodes WHERE id = ?1", params![node.id])?;
            }
            insert_node_row(&tx, node)?;
            tx.commit()?;
            Ok(!existed)
        })?;
        Ok((node.clone(), created))
    }

    /// Replace an existing node's row and content-store record in place.
    /// Errors with `NotFound` if `node.id` isn't present. Runs as a single
    /// transaction.
    pub fn update_node(&self, node: &Node) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !node_exists(&tx, &node.id)? {
                return Err(StorageError::NotFound(node.id.clone()));
            }
            self.content.write(node)?;
            delete_child_rows(&tx, &node.id)?;
            tx.execute("DELETE FROM nodes WHERE id = ?1", params![node.id])?;
            insert_node_row(&tx, node)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete a node and every row that references it (child tables, edges,
    /// the FTS entry, and the embedding index), by cascade where SQLite's
    /// foreign keys cover it and explicitly where they don't (`nodes_fts`,
    /// `node_embeddings_vec`, both virtual tables with no FK support). Runs
    /// as a single transaction.
    pub fn delete_node(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !node_exists(&tx, id)? {
                return Err(StorageError::NotFound(id.to_string()));
            }
            tx.execute("DELETE FROM nodes_fts WHERE node_id = ?1", params![id])?;
            tx.execute("DELETE FROM node_embeddings_vec WHERE node_id = ?1", params![id]).ok();
            tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Fetch the current (latest) version of a node from the relational
    /// index — the index only ever reflects the latest version; older
    /// versions live solely in the content store (`get_node_version`).
    pub fn get_node(&self, id: &str) -> Result<Node> {
        self.with_reader(|conn| read_node_row(conn, id))
    }

    pub fn node_exists(&self, id: &str) -> Result<bool> {
        self.with_reader(|conn| node_exists(conn, id))
    }

    /// Fetch a specific historical version straight from the content store.
    pub fn get_node_version(&self, id: &str, version: u32) -> Result<Node> {
        let entry = self
            .content
            .list_versions(id)?
            .into_iter()
            .find(|e| e.version == version)
            .ok_or_else(|| StorageError::NotFound(format!("{id}-v{version}")))?;
        self.content.read_from_path(&entry.path)
    }

    /// Every version of a node, oldest first, read from the content store.
    pub fn get_all_node_versions(&self, id: &str) -> Result<Vec<Node>> {
        self.content
            .list_versions(id)?
            .into_iter()
            .map(|entry| self.content.read_from_path(&entry.path))
            .collect()
    }

    /// Wipe every row and content-store record. Used by tests and by the
    /// operator-facing "start over" path; never called from ingestion.
    pub fn clear_all_data(&self) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            for table in [
                "daemon_decisions",
                "tool_errors",
                "model_quirks",
                "lesson_tags",
                "lessons",
                "topics",
                "tags",
                "edges",
                "node_embeddings",
                "nodes_fts",
                "nodes",
            ] {
                tx.execute(&format!("DELETE FROM {table}"), [])?;
            }
            tx.execute("DELETE FROM node_embeddings_vec", []).ok();
            tx.commit()?;
            Ok(())
        })?;
        if self.content.root().exists() {
            std::fs::remove_dir_all(self.content.root())?;
            std::fs::create_dir_all(self.content.root())?;
        }
        Ok(())
    }

    /// Rollup counters across the whole graph.
    pub fn get_stats(&self) -> Result<GraphStats> {
        self.with_reader(|conn| {
            let node_count: u64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
            let edge_count: u64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
            let lesson_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM lessons", [], |r| r.get(0))?;
            let quirk_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM model_quirks", [], |r| r.get(0))?;
            let tool_error_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM tool_errors", [], |r| r.get(0))?;
            let total_tokens_used: u64 = conn.query_row(
                "SELECT COALESCE(SUM(tokens_used), 0) FROM nodes",
                [],
                |r| r.get(0),
            )?;
            let total_cost: f64 =
                conn.query_row("SELECT COALESCE(SUM(cost), 0.0) FROM nodes", [], |r| r.get(0))?;
            let project_count: u64 = conn.query_row(
                "SELECT COUNT(DISTINCT project) FROM nodes WHERE project != ''",
                [],
                |r| r.get(0),
            )?;
            let embedded_node_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM node_embeddings", [], |r| r.get(0))?;

            Ok(GraphStats {
                node_count,
                edge_count,
                lesson_count,
                quirk_count,
                tool_error_count,
                total_tokens_used,
                total_cost,
                project_count,
                embedded_node_count,
            })
        })
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn configure_reader_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

fn node_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM nodes WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// `session_file` of the currently-stored node with `id`, if any — used to
/// tell a benign re-ingestion of the same segment apart from a genuine
/// deterministic-id collision across two different sessions.
fn existing_session_file(conn: &Connection, id: &str) -> Result<Option<String>> {
    conn.query_row("SELECT session_file FROM nodes WHERE id = ?1", params![id], |r| r.get(0))
        .optional()
        .map_err(StorageError::from)
}

fn delete_child_rows(conn: &Connection, node_id: &str) -> Result<()> {
    conn.execute("DELETE FROM nodes_fts WHERE node_id = ?1", params![node_id])?;
    conn.execute(
        "DELETE FROM node_embeddings_vec WHERE node_id = ?1",
        params![node_id],
    )
    .ok();
    // tags/topics/lessons/lesson_tags/model_quirks/tool_errors/daemon_decisions/
    // node_embeddings cascade off `nodes` via ON DELETE CASCADE once the
    // `nodes` row itself is deleted by the caller.
    Ok(())
}

/// Insert `node`'s row, child rows, and FTS entry. Does not touch the
/// content store — callers write that separately so `upsert_node` can share
/// this with `create_node`/`update_node` without double-writing.
pub(crate) fn insert_node_row(conn: &Connection, node: &Node) -> Result<()> {
    let data_file = format!(
        "{:04}/{:02}/{}-v{}.json",
        node.metadata.timestamp.format("%Y"),
        node.metadata.timestamp.format("%m"),
        node.id,
        node.version
    );
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO nodes (
            id, version, previous_versions,
            session_file, segment_start, segment_end, entry_count, computer, session_id, parent_session,
            type, project, is_new_project, had_clear_goal, language, frameworks,
            summary, outcome, key_decisions, files_touched, tools_used, errors_seen,
            models_used, prompting_wins, prompting_failures,
            tokens_used, cost, duration_minutes, timestamp, analyzed_at, analyzer_version,
            related_projects, concepts,
            rlm_used, codemap_available, analysis_log, segment_token_count,
            signals, relevance_score, last_accessed, archived, importance,
            data_file, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22,
            ?23, ?24, ?25,
            ?26, ?27, ?28, ?29, ?30, ?31,
            ?32, ?33,
            ?34, ?35, ?36, ?37,
            ?38, ?39, ?40, ?41, ?42,
            ?43, ?44, ?45
        )",
        params![
            node.id,
            node.version,
            json_text(&node.previous_versions)?,
            node.source.session_file,
            node.source.segment.start_entry_id,
            node.source.segment.end_entry_id,
            node.source.segment.entry_count,
            node.source.computer,
            node.source.session_id,
            node.source.parent_session,
            node.node_type.as_str(),
            node.project,
            node.is_new_project,
            node.had_clear_goal,
            node.language,
            json_text(&node.frameworks)?,
            node.summary,
            node.outcome.as_str(),
            json_text(&node.key_decisions)?,
            json_text(&node.files_touched)?,
            json_text(&node.tools_used)?,
            json_text(&node.errors_seen)?,
            json_text(&node.models_used)?,
            json_text(&node.prompting_wins)?,
            json_text(&node.prompting_failures)?,
            node.metadata.tokens_used,
            node.metadata.cost,
            node.metadata.duration_minutes,
            node.metadata.timestamp.to_rfc3339(),
            node.metadata.analyzed_at.to_rfc3339(),
            node.metadata.analyzer_version,
            json_text(&node.related_projects)?,
            json_text(&node.concepts)?,
            node.daemon_meta.rlm_used,
            node.daemon_meta.codemap_available,
            node.daemon_meta.analysis_log,
            node.daemon_meta.segment_token_count,
            node.signals,
            node.relevance_score,
            node.last_accessed.map(|t| t.to_rfc3339()),
            node.archived,
            node.importance,
            data_file,
            now.clone(),
            now,
        ],
    )?;

    for tag in &node.tags {
        conn.execute(
            "INSERT OR IGNORE INTO tags (node_id, tag) VALUES (?1, ?2)",
            params![node.id, tag],
        )?;
    }
    for topic in &node.topics {
        conn.execute(
            "INSERT OR IGNORE INTO topics (node_id, topic) VALUES (?1, ?2)",
            params![node.id, topic],
        )?;
    }

    for lesson in &node.lessons {
        let lesson_id = if lesson.id.is_empty() {
            crate::id::lesson_id()
        } else {
            lesson.id.clone()
        };
        conn.execute(
            "INSERT INTO lessons (id, node_id, level, summary, details, confidence, actionable, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                lesson_id,
                node.id,
                lesson.level.as_str(),
                lesson.summary,
                lesson.details,
                lesson.confidence.as_str(),
                lesson.actionable,
                node.metadata.timestamp.to_rfc3339(),
            ],
        )?;
        for tag in &lesson.tags {
            conn.execute(
                "INSERT OR IGNORE INTO lesson_tags (lesson_id, tag) VALUES (?1, ?2)",
                params![lesson_id, tag],
            )?;
        }
    }

    for quirk in &node.model_quirks {
        let quirk_id = if quirk.id.is_empty() {
            crate::id::quirk_id()
        } else {
            quirk.id.clone()
        };
        conn.execute(
            "INSERT INTO model_quirks (id, node_id, model, observation, frequency, workaround, severity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                quirk_id,
                node.id,
                quirk.model,
                quirk.observation,
                quirk.frequency.as_str(),
                quirk.workaround,
                quirk.severity.as_str(),
                node.metadata.timestamp.to_rfc3339(),
            ],
        )?;
    }

    for err in &node.tool_use_errors {
        let err_id = if err.id.is_empty() {
            crate::id::tool_error_id()
        } else {
            err.id.clone()
        };
        conn.execute(
            "INSERT INTO tool_errors (id, node_id, tool, error_type, context, model, was_retried, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                err_id,
                node.id,
                err.tool,
                err.error_type,
                err.context,
                err.model,
                err.was_retried,
                node.metadata.timestamp.to_rfc3339(),
            ],
        )?;
    }

    for decision in &node.daemon_meta.decisions {
        let decision_id = if decision.id.is_empty() {
            crate::id::decision_id()
        } else {
            decision.id.clone()
        };
        conn.execute(
            "INSERT INTO daemon_decisions (id, node_id, timestamp, decision, reasoning, needs_review, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                decision_id,
                node.id,
                decision.timestamp.to_rfc3339(),
                decision.decision,
                decision.reasoning,
                decision.needs_review,
                decision.timestamp.to_rfc3339(),
            ],
        )?;
    }

    conn.execute(
        "INSERT INTO nodes_fts (node_id, summary, decisions, lessons, tags, topics) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            node.id,
            node.summary,
            node.decisions_text(),
            node.lessons_text(),
            node.effective_tags().join(" "),
            node.topics.join(" "),
        ],
    )?;

    Ok(())
}

fn read_node_row(conn: &Connection, id: &str) -> Result<Node> {
    let node = conn
        .query_row(
            "SELECT * FROM nodes WHERE id = ?1",
            params![id],
            row_to_node,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(id.to_string()),
            other => StorageError::Database(other),
        })?;
    hydrate_node(conn, node)
}

/// Build a `Node` from a `nodes` row, leaving `lessons`/`model_quirks`/
/// `tool_use_errors`/`daemon_meta.decisions`/`tags`/`topics` empty —
/// `hydrate_node` fills those in from the child tables.
pub(crate) fn row_to_node(row: &Row) -> rusqlite::Result<Node> {
    let timestamp: String = row.get("timestamp")?;
    let analyzed_at: String = row.get("analyzed_at")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;

    Ok(Node {
        id: row.get("id")?,
        version: row.get("version")?,
        previous_versions: json_vec(&row.get::<_, String>("previous_versions")?),
        source: NodeSource {
            session_file: row.get("session_file")?,
            segment: Segment {
                start_entry_id: row.get("segment_start")?,
                end_entry_id: row.get("segment_end")?,
                entry_count: row.get("entry_count")?,
            },
            computer: row.get("computer")?,
            session_id: row.get("session_id")?,
            parent_session: row.get("parent_session")?,
        },
        node_type: NodeType::parse_name(&row.get::<_, String>("type")?),
        project: row.get("project")?,
        is_new_project: row.get("is_new_project")?,
        had_clear_goal: row.get("had_clear_goal")?,
        language: row.get("language")?,
        frameworks: json_vec(&row.get::<_, String>("frameworks")?),
        summary: row.get("summary")?,
        outcome: Outcome::parse_name(&row.get::<_, String>("outcome")?),
        key_decisions: json_vec::<Vec<KeyDecision>>(&row.get::<_, String>("key_decisions")?),
        files_touched: json_vec(&row.get::<_, String>("files_touched")?),
        tools_used: json_vec(&row.get::<_, String>("tools_used")?),
        errors_seen: json_vec::<Vec<ErrorSeen>>(&row.get::<_, String>("errors_seen")?),
        lessons: Vec::new(),
        models_used: json_vec::<Vec<ModelUsage>>(&row.get::<_, String>("models_used")?),
        prompting_wins: json_vec(&row.get::<_, String>("prompting_wins")?),
        prompting_failures: json_vec(&row.get::<_, String>("prompting_failures")?),
        model_quirks: Vec::new(),
        tool_use_errors: Vec::new(),
        metadata: NodeMetadata {
            tokens_used: row.get("tokens_used")?,
            cost: row.get("cost")?,
            duration_minutes: row.get("duration_minutes")?,
            timestamp: parse_rfc3339(&timestamp),
            analyzed_at: parse_rfc3339(&analyzed_at),
            analyzer_version: row.get("analyzer_version")?,
        },
        tags: Vec::new(),
        topics: Vec::new(),
        related_projects: json_vec(&row.get::<_, String>("related_projects")?),
        concepts: json_vec(&row.get::<_, String>("concepts")?),
        daemon_meta: DaemonMeta {
            decisions: Vec::new(),
            rlm_used: row.get("rlm_used")?,
            codemap_available: row.get("codemap_available")?,
            analysis_log: row.get("analysis_log")?,
            segment_token_count: row.get("segment_token_count")?,
        },
        signals: row.get("signals")?,
        relevance_score: row.get("relevance_score")?,
        last_accessed: last_accessed.as_deref().map(parse_rfc3339),
        archived: row.get("archived")?,
        importance: row.get("importance")?,
        extra: serde_json::Map::new(),
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

/// Fill in a row-shaped `Node`'s child-table fields (tags, topics, lessons,
/// quirks, tool errors, daemon decisions) with one query per table.
pub(crate) fn hydrate_node(conn: &Connection, mut node: Node) -> Result<Node> {
    let mut tags_stmt = conn.prepare("SELECT tag FROM tags WHERE node_id = ?1 ORDER BY tag")?;
    node.tags = tags_stmt
        .query_map(params![node.id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut topics_stmt = conn.prepare("SELECT topic FROM topics WHERE node_id = ?1 ORDER BY topic")?;
    node.topics = topics_stmt
        .query_map(params![node.id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut lessons_stmt = conn.prepare(
        "SELECT id, level, summary, details, confidence, actionable FROM lessons WHERE node_id = ?1 ORDER BY created_at",
    )?;
    let lesson_rows = lessons_stmt
        .query_map(params![node.id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<bool>>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut lessons = Vec::with_capacity(lesson_rows.len());
    for (id, level, summary, details, confidence, actionable) in lesson_rows {
        let mut tag_stmt = conn.prepare("SELECT tag FROM lesson_tags WHERE lesson_id = ?1 ORDER BY tag")?;
        let tags = tag_stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        lessons.push(Lesson {
            id,
            level: LessonLevel::parse_name(&level),
            summary,
            details,
            confidence: Confidence::parse_name(&confidence),
            tags,
            actionable,
        });
    }
    node.lessons = lessons;

    let mut quirks_stmt = conn.prepare(
        "SELECT id, model, observation, frequency, workaround, severity FROM model_quirks WHERE node_id = ?1 ORDER BY created_at",
    )?;
    node.model_quirks = quirks_stmt
        .query_map(params![node.id], |r| {
            Ok(ModelQuirk {
                id: r.get(0)?,
                model: r.get(1)?,
                observation: r.get(2)?,
                frequency: Frequency::parse_name(&r.get::<_, String>(3)?),
                workaround: r.get(4)?,
                severity: Severity::parse_name(&r.get::<_, String>(5)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut errors_stmt = conn.prepare(
        "SELECT id, tool, error_type, context, model, was_retried FROM tool_errors WHERE node_id = ?1 ORDER BY created_at",
    )?;
    node.tool_use_errors = errors_stmt
        .query_map(params![node.id], |r| {
            Ok(ToolUseError {
                id: r.get(0)?,
                tool: r.get(1)?,
                error_type: r.get(2)?,
                context: r.get(3)?,
                model: r.get(4)?,
                was_retried: r.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut decisions_stmt = conn.prepare(
        "SELECT id, timestamp, decision, reasoning, needs_review FROM daemon_decisions WHERE node_id = ?1 ORDER BY timestamp",
    )?;
    node.daemon_meta.decisions = decisions_stmt
        .query_map(params![node.id], |r| {
            let ts: String = r.get(1)?;
            Ok(DaemonDecisionRecord {
                id: r.get(0)?,
                timestamp: parse_rfc3339(&ts),
                decision: r.get(2)?,
                reasoning: r.get(3)?,
                needs_review: r.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(node)
}

/// Parsed the same conservative way every enum in `memory::node` is; exposed
/// to `storage::edges` since edge creation lives there.
pub(crate) fn parse_edge_creator(s: &str) -> EdgeCreator {
    EdgeCreator::parse_name(s)
}
