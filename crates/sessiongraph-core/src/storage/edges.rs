//! Edge CRUD and the boundary auto-linker (SPEC_FULL §4.5, §4.7).

use crate::error::{Result, StorageError};
use crate::id;
use crate::memory::{Edge, EdgeCreator, EdgeType, Node};
use crate::storage::sqlite::{parse_edge_creator, Storage};
use rusqlite::{params, Connection, OptionalExtension};

impl Storage {
    /// Create an edge. `id` is generated if the caller passes an empty one.
    /// Errors with `AlreadyExists` if `(source, target, type)` is already
    /// present — the unique index backs idempotent auto-linking.
    pub fn create_edge(&self, edge: &Edge) -> Result<Edge> {
        let mut edge = edge.clone();
        if edge.id.is_empty() {
            edge.id = id::edge_id();
        }
        self.with_writer(|conn| {
            insert_edge(conn, &edge).map_err(|e| match e {
                StorageError::Database(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::AlreadyExists(format!(
                        "{}->{} ({})",
                        edge.source_node_id, edge.target_node_id, edge.edge_type
                    ))
                }
                other => other,
            })
        })?;
        Ok(edge)
    }

    pub fn get_edge(&self, id: &str) -> Result<Edge> {
        self.with_reader(|conn| {
            conn.query_row("SELECT * FROM edges WHERE id = ?1", params![id], row_to_edge)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(id.to_string()),
                    other => StorageError::Database(other),
                })
        })
    }

    pub fn delete_edge(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            let changed = conn.execute("DELETE FROM edges WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    /// Every edge whose `source_node_id` is `node_id`.
    pub fn get_edges_from(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM edges WHERE source_node_id = ?1 ORDER BY created_at")?;
            let rows = stmt.query_map(params![node_id], row_to_edge)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
        })
    }

    /// Every edge whose `target_node_id` is `node_id`.
    pub fn get_edges_to(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM edges WHERE target_node_id = ?1 ORDER BY created_at")?;
            let rows = stmt.query_map(params![node_id], row_to_edge)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
        })
    }

    /// Every edge touching `node_id`, either direction.
    pub fn get_node_edges(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM edges WHERE source_node_id = ?1 OR target_node_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![node_id], row_to_edge)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
        })
    }

    /// Whether an edge `source -> target` exists, optionally restricted to
    /// one `edge_type`.
    pub fn edge_exists(&self, source: &str, target: &str, edge_type: Option<EdgeType>) -> Result<bool> {
        self.with_reader(|conn| match edge_type {
            Some(t) => {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM edges WHERE source_node_id = ?1 AND target_node_id = ?2 AND type = ?3",
                    params![source, target, t.as_str()],
                    |r| r.get(0),
                )?;
                Ok(count > 0)
            }
            None => {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM edges WHERE source_node_id = ?1 AND target_node_id = ?2",
                    params![source, target],
                    |r| r.get(0),
                )?;
                Ok(count > 0)
            }
        })
    }

    /// Auto-link a freshly-ingested node to its session predecessor(s), per
    /// SPEC_FULL §4.7. Up to two structural edges are created, independently
    /// of one another:
    ///
    /// 1. **Continuation/resume/…**: the most recent node in the same
    ///    `session_file`, ordered by `(timestamp DESC, segment_end DESC,
    ///    version DESC)`, excluding `node` itself. If found and no edge
    ///    already exists between it and `node`, an edge is created whose
    ///    type is `boundary_type` if that is one of `{continuation, resume,
    ///    fork, branch, tree_jump, compaction}`, else `continuation`.
    /// 2. **Fork**: if `node.source.parent_session` is set and there is no
    ///    incoming same-session edge to `node` yet, link the last node of
    ///    the parent session to `node` as `fork`.
    ///
    /// Both checks are idempotent: re-running over the same transcript
    /// returns an empty list the second time.
    pub fn link_node_to_predecessors(
        &self,
        node: &Node,
        boundary_type: Option<EdgeType>,
    ) -> Result<Vec<Edge>> {
        let mut created = Vec::new();
        let continuation_type = boundary_type
            .filter(|t| {
                matches!(
                    t,
                    EdgeType::Continuation
                        | EdgeType::Resume
                        | EdgeType::Fork
                        | EdgeType::Branch
                        | EdgeType::TreeJump
                        | EdgeType::Compaction
                )
            })
            .unwrap_or(EdgeType::Continuation);

        let predecessor = self.with_reader(|conn| {
            find_predecessor_in_session(conn, &node.source.session_file, &node.id)
        })?;
        if let Some(predecessor_id) = predecessor {
            if let Some(edge) = self.try_link(&predecessor_id, &node.id, continuation_type, EdgeCreator::Boundary)? {
                created.push(edge);
            }
        }

        if let Some(parent_session) = &node.source.parent_session {
            if let Some(parent_id) = self.with_reader(|conn| {
                find_latest_node_id_for_session(conn, parent_session)
            })? {
                if let Some(edge) = self.try_link(&parent_id, &node.id, EdgeType::Fork, EdgeCreator::Boundary)? {
                    created.push(edge);
                }
            }
        }

        Ok(created)
    }

    /// Create `source -> target` of `edge_type` if it doesn't already exist;
    /// returns `None` on the idempotent no-op path instead of erroring.
    fn try_link(
        &self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        created_by: EdgeCreator,
    ) -> Result<Option<Edge>> {
        let edge = Edge {
            id: id::edge_id(),
            source_node_id: source.to_string(),
            target_node_id: target.to_string(),
            edge_type,
            metadata: serde_json::json!({}),
            confidence: 1.0,
            created_at: chrono::Utc::now(),
            created_by,
        };
        match self.create_edge(&edge) {
            Ok(edge) => {
                tracing::info!(source, target, edge_type = %edge.edge_type, "auto-linked node");
                Ok(Some(edge))
            }
            Err(StorageError::AlreadyExists(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }
}

fn insert_edge(conn: &Connection, edge: &Edge) -> Result<()> {
    conn.execute(
        "INSERT INTO edges (id, source_node_id, target_node_id, type, metadata, confidence, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            edge.id,
            edge.source_node_id,
            edge.target_node_id,
            edge.edge_type.as_str(),
            serde_json::to_string(&edge.metadata)?,
            edge.confidence,
            edge.created_at.to_rfc3339(),
            edge.created_by.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    let metadata_text: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    Ok(Edge {
        id: row.get("id")?,
        source_node_id: row.get("source_node_id")?,
        target_node_id: row.get("target_node_id")?,
        edge_type: EdgeType::parse_name(&row.get::<_, String>("type")?),
        metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::json!({})),
        confidence: row.get("confidence")?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        created_by: parse_edge_creator(&row.get::<_, String>("created_by")?),
    })
}

fn find_latest_node_id_for_session(conn: &Connection, session_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM nodes WHERE session_id = ?1
             ORDER BY timestamp DESC, segment_end DESC, version DESC LIMIT 1",
            params![session_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Most recent other node in the same `session_file`, per SPEC_FULL §4.7's
/// `(timestamp DESC, segment_end DESC, version DESC)` ordering.
fn find_predecessor_in_session(
    conn: &Connection,
    session_file: &str,
    exclude_id: &str,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM nodes
             WHERE session_file = ?1 AND id != ?2
             ORDER BY timestamp DESC, segment_end DESC, version DESC LIMIT 1",
            params![session_file, exclude_id],
            |r| r.get(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_support::sample_node;
    use crate::storage::Storage;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open_in_memory(dir.path().join("nodes")).unwrap();
        (storage, dir)
    }

    #[test]
    fn create_edge_then_get_round_trips() {
        let (storage, _dir) = test_storage();
        let a = sample_node("a1b2c3d4e5f60718", 1);
        let mut b = sample_node("b2c3d4e5f6071829", 1);
        b.source.session_id = a.source.session_id.clone();
        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        let edge = Edge {
            id: String::new(),
            source_node_id: a.id.clone(),
            target_node_id: b.id.clone(),
            edge_type: EdgeType::Continuation,
            metadata: serde_json::json!({}),
            confidence: 1.0,
            created_at: chrono::Utc::now(),
            created_by: EdgeCreator::Daemon,
        };
        let created = storage.create_edge(&edge).unwrap();
        let fetched = storage.get_edge(&created.id).unwrap();
        assert_eq!(fetched.source_node_id, a.id);
        assert_eq!(fetched.target_node_id, b.id);
    }

    #[test]
    fn duplicate_edge_errors_already_exists() {
        let (storage, _dir) = test_storage();
        let a = sample_node("a1b2c3d4e5f60718", 1);
        let b = sample_node("b2c3d4e5f6071829", 1);
        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        let edge = Edge {
            id: String::new(),
            source_node_id: a.id.clone(),
            target_node_id: b.id.clone(),
            edge_type: EdgeType::Continuation,
            metadata: serde_json::json!({}),
            confidence: 1.0,
            created_at: chrono::Utc::now(),
            created_by: EdgeCreator::Daemon,
        };
        storage.create_edge(&edge).unwrap();
        let mut dup = edge.clone();
        dup.id = String::new();
        let err = storage.create_edge(&dup).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn edge_exists_checks_with_and_without_type() {
        let (storage, _dir) = test_storage();
        let a = sample_node("a1b2c3d4e5f60718", 1);
        let b = sample_node("b2c3d4e5f6071829", 1);
        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        assert!(!storage.edge_exists(&a.id, &b.id, None).unwrap());

        storage
            .create_edge(&Edge {
                id: String::new(),
                source_node_id: a.id.clone(),
                target_node_id: b.id.clone(),
                edge_type: EdgeType::Fork,
                metadata: serde_json::json!({}),
                confidence: 1.0,
                created_at: chrono::Utc::now(),
                created_by: EdgeCreator::Daemon,
            })
            .unwrap();

        assert!(storage.edge_exists(&a.id, &b.id, None).unwrap());
        assert!(storage.edge_exists(&a.id, &b.id, Some(EdgeType::Fork)).unwrap());
        assert!(!storage.edge_exists(&a.id, &b.id, Some(EdgeType::Continuation)).unwrap());
    }

    #[test]
    fn link_node_to_predecessors_is_idempotent() {
        let (storage, _dir) = test_storage();
        let mut a = sample_node("a1b2c3d4e5f60718", 1);
        a.metadata.timestamp = chrono::Utc::now() - chrono::Duration::minutes(10);
        let b = sample_node("b2c3d4e5f6071829", 1);

        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        let first = storage.link_node_to_predecessors(&b, None).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].edge_type, EdgeType::Continuation);

        let second = storage.link_node_to_predecessors(&b, None).unwrap();
        assert!(second.is_empty(), "re-running the auto-linker must not duplicate edges");

        let edges = storage.get_edges_to(&b.id).unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn link_node_to_predecessors_honors_boundary_type() {
        let (storage, _dir) = test_storage();
        let mut a = sample_node("a1b2c3d4e5f60718", 1);
        a.metadata.timestamp = chrono::Utc::now() - chrono::Duration::minutes(10);
        let b = sample_node("b2c3d4e5f6071829", 1);
        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        let edges = storage
            .link_node_to_predecessors(&b, Some(EdgeType::Resume))
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Resume);
    }

    #[test]
    fn fork_links_to_parent_session_head() {
        let (storage, _dir) = test_storage();
        let parent = sample_node("a1b2c3d4e5f60718", 1);
        storage.create_node(&parent).unwrap();

        let mut child = sample_node("b2c3d4e5f6071829", 1);
        child.source.session_file = "/sessions/child.jsonl".to_string();
        child.source.session_id = "different-session".to_string();
        child.source.parent_session = Some(parent.source.session_id.clone());
        storage.create_node(&child).unwrap();

        let edges = storage.link_node_to_predecessors(&child, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Fork);
        assert_eq!(edges[0].source_node_id, parent.id);
    }

    #[test]
    fn continuation_and_fork_can_both_fire_for_the_same_node() {
        let (storage, _dir) = test_storage();
        let mut predecessor = sample_node("a1b2c3d4e5f60718", 1);
        predecessor.metadata.timestamp = chrono::Utc::now() - chrono::Duration::minutes(10);
        storage.create_node(&predecessor).unwrap();

        let mut other_session = sample_node("c3d4e5f607182930", 1);
        other_session.source.session_id = "parent-session".to_string();
        other_session.source.session_file = "/sessions/other.jsonl".to_string();
        storage.create_node(&other_session).unwrap();

        let mut node = sample_node("b2c3d4e5f6071829", 1);
        node.source.parent_session = Some("parent-session".to_string());
        storage.create_node(&node).unwrap();

        let edges = storage.link_node_to_predecessors(&node, None).unwrap();
        assert_eq!(edges.len(), 2, "same-session continuation and cross-session fork are independent");
        assert!(edges.iter().any(|e| e.edge_type == EdgeType::Continuation));
        assert!(edges.iter().any(|e| e.edge_type == EdgeType::Fork));
    }
}
