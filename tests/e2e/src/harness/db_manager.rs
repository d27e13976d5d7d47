//! Test Graph Manager
//!
//! Provides isolated storage instances for integration tests:
//! - Temporary storage, automatically cleaned up
//! - Seeding helpers for chains of nodes within one session
//! - Snapshot and restore
//! - Concurrent test isolation (each manager gets its own temp dir)

use sessiongraph_core::{Node, NodeFilters, Storage};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::mocks::fixtures::NodeBuilder;

/// Manager for test storage instances.
///
/// Creates an isolated `Storage` per test, backed by a temp directory for
/// both the SQLite file and the content store, preventing cross-test
/// interference. Cleaned up automatically when dropped.
pub struct TestGraphManager {
    pub storage: Storage,
    _temp_dir: TempDir,
    db_path: PathBuf,
    snapshot: Option<Vec<Node>>,
}

impl TestGraphManager {
    /// Create a new test storage instance in a temporary directory.
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db_path = temp_dir.path().join("test_sessiongraph.db");
        let config = sessiongraph_core::StorageConfig {
            db_path: db_path.clone(),
            content_root: temp_dir.path().join("content"),
            embedding_dimensions: 8,
            max_list_limit: 500,
            backfill_batch_size: 8,
        };
        let storage = Storage::new(config).expect("failed to create test storage");

        Self { storage, _temp_dir: temp_dir, db_path, snapshot: None }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    pub fn node_count(&self) -> u64 {
        self.storage.get_stats().map(|s| s.node_count).unwrap_or(0)
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    /// Seed `count` unrelated nodes, one project each round-robin'd across a
    /// handful of projects, all in the same `session_file`.
    pub fn seed_nodes(&mut self, session_file: &str, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let node = NodeBuilder::new(session_file, &format!("e{i}"), &format!("e{}", i + 1))
                .summary(format!("test node content {i}"))
                .tag(format!("test-{}", i % 5))
                .build();
            if self.storage.create_node(&node).is_ok() {
                ids.push(node.id);
            }
        }
        ids
    }

    /// Seed a chain of `count` nodes in `session_file`, each node's segment
    /// immediately following the previous one's, linked via the auto-linker.
    pub fn seed_chain(&mut self, session_file: &str, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let node = NodeBuilder::new(session_file, &format!("e{i}"), &format!("e{}", i + 1))
                .summary(format!("chain node {i}"))
                .build();
            self.storage.create_node(&node).expect("seed_chain: create_node");
            self.storage
                .link_node_to_predecessors(&node, None)
                .expect("seed_chain: link_node_to_predecessors");
            ids.push(node.id);
        }
        ids
    }

    // ========================================================================
    // SNAPSHOT / RESTORE
    // ========================================================================

    pub fn take_snapshot(&mut self) {
        let nodes = self
            .storage
            .list_nodes(&NodeFilters::default(), &sessiongraph_core::ListOpts {
                limit: Some(10_000),
                ..Default::default()
            })
            .map(|r| r.items)
            .unwrap_or_default();
        self.snapshot = Some(nodes);
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Clear then re-insert every node captured by the last `take_snapshot`.
    /// Edges are not restored; this is a node-level rollback only.
    pub fn restore_snapshot(&mut self) -> bool {
        let Some(nodes) = self.snapshot.clone() else {
            return false;
        };
        self.clear();
        for node in nodes {
            let _ = self.storage.create_node(&node);
        }
        true
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Delete every node currently stored.
    pub fn clear(&mut self) {
        if let Ok(result) = self.storage.list_nodes(&NodeFilters::default(), &sessiongraph_core::ListOpts {
            limit: Some(10_000),
            ..Default::default()
        }) {
            for node in result.items {
                let _ = self.storage.delete_node(&node.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_storage_starts_empty() {
        let db = TestGraphManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().parent().unwrap().exists());
    }

    #[test]
    fn seed_nodes_creates_the_requested_count() {
        let mut db = TestGraphManager::new_temp();
        let ids = db.seed_nodes("/s.jsonl", 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(db.node_count(), 10);
    }

    #[test]
    fn clear_removes_every_node() {
        let mut db = TestGraphManager::new_temp();
        db.seed_nodes("/s.jsonl", 5);
        assert_eq!(db.node_count(), 5);
        db.clear();
        assert!(db.is_empty());
    }

    #[test]
    fn snapshot_and_restore_round_trips_node_count() {
        let mut db = TestGraphManager::new_temp();
        db.seed_nodes("/s.jsonl", 5);
        db.take_snapshot();
        assert!(db.has_snapshot());
        db.clear();
        assert!(db.is_empty());
        db.restore_snapshot();
        assert_eq!(db.node_count(), 5);
    }
}
