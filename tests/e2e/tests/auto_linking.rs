//! Coverage of the structural auto-linker: continuation edges within a
//! session, fork edges across a parent/child session boundary, and
//! idempotence of both.

use chrono::{Duration, Utc};
use sessiongraph_core::EdgeType;
use sessiongraph_e2e_tests::harness::TestGraphManager;
use sessiongraph_e2e_tests::mocks::NodeBuilder;

#[test]
fn continuation_edge_is_created_once_and_is_idempotent() {
    let mut db = TestGraphManager::new_temp();
    let now = Utc::now();

    let n1 = NodeBuilder::new("/s.jsonl", "e1", "e5").timestamp(now).build();
    let n2 = NodeBuilder::new("/s.jsonl", "e6", "e10").timestamp(now + Duration::minutes(10)).build();
    db.storage.create_node(&n1).unwrap();
    db.storage.create_node(&n2).unwrap();

    let created = db.storage.link_node_to_predecessors(&n2, None).unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].source_node_id, n1.id);
    assert_eq!(created[0].target_node_id, n2.id);
    assert_eq!(created[0].edge_type, EdgeType::Continuation);

    let second_run = db.storage.link_node_to_predecessors(&n2, None).unwrap();
    assert!(second_run.is_empty(), "re-running the linker over the same transcript must be a no-op");
    let third_run = db.storage.link_node_to_predecessors(&n2, None).unwrap();
    assert!(third_run.is_empty());

    let incoming = db.storage.get_edges_to(&n2.id).unwrap();
    assert_eq!(incoming.len(), 1);
}

#[test]
fn fork_edge_links_the_parent_sessions_last_node() {
    let mut db = TestGraphManager::new_temp();
    let now = Utc::now();

    let n1 = NodeBuilder::new("/s.jsonl", "e1", "e5").timestamp(now).build();
    let n2 =
        NodeBuilder::new("/s.jsonl", "e6", "e10").timestamp(now + Duration::minutes(10)).build();
    let p1 = NodeBuilder::new("/p.jsonl", "e1", "e5").timestamp(now - Duration::hours(1)).build();
    let forked = NodeBuilder::new("/s.jsonl", "e11", "e15")
        .timestamp(now + Duration::minutes(20))
        .parent_session("/p.jsonl")
        .build();

    db.storage.create_node(&n1).unwrap();
    db.storage.create_node(&n2).unwrap();
    db.storage.create_node(&p1).unwrap();
    db.storage.create_node(&forked).unwrap();

    db.storage.link_node_to_predecessors(&n2, None).unwrap();
    let created = db.storage.link_node_to_predecessors(&forked, None).unwrap();

    // One continuation edge (n2 -> forked) and one fork edge (p1 -> forked).
    assert_eq!(created.len(), 2);
    assert!(created.iter().any(|e| e.edge_type == EdgeType::Continuation && e.source_node_id == n2.id));
    assert!(created.iter().any(|e| e.edge_type == EdgeType::Fork && e.source_node_id == p1.id));

    let incoming = db.storage.get_edges_to(&forked.id).unwrap();
    assert_eq!(incoming.len(), 2);

    let second_run = db.storage.link_node_to_predecessors(&forked, None).unwrap();
    assert!(second_run.is_empty());
}
