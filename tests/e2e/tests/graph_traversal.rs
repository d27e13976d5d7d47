//! BFS traversal depth clamping and hop-distance bookkeeping.

use chrono::{Duration, Utc};
use sessiongraph_core::{Edge, EdgeCreator, EdgeType, TraversalDirection};
use sessiongraph_e2e_tests::harness::TestGraphManager;
use sessiongraph_e2e_tests::mocks::NodeBuilder;

#[test]
fn bfs_clamps_to_max_depth_and_reports_hop_distance() {
    let mut db = TestGraphManager::new_temp();
    let now = Utc::now();

    // A chain of 7 nodes, 0 -> 1 -> ... -> 6, each in its own segment of one session.
    let mut ids = Vec::new();
    for i in 0..7 {
        let node = NodeBuilder::new("/s.jsonl", &format!("e{i}"), &format!("e{}", i + 1))
            .timestamp(now + Duration::minutes(i as i64))
            .build();
        db.storage.create_node(&node).unwrap();
        ids.push(node.id);
    }
    for i in 0..6 {
        db.storage
            .create_edge(&Edge {
                id: format!("edg_{i}"),
                source_node_id: ids[i].clone(),
                target_node_id: ids[i + 1].clone(),
                edge_type: EdgeType::Continuation,
                metadata: serde_json::Value::Null,
                confidence: 1.0,
                created_at: Utc::now(),
                created_by: EdgeCreator::Boundary,
            })
            .unwrap();
    }

    // Requesting depth 10 must clamp to MAX_BFS_DEPTH (5).
    let connected = db.storage.get_connected_nodes(&ids[0], Some(10), TraversalDirection::Out, None).unwrap();

    assert_eq!(connected.root_node_id, ids[0]);
    let reached: std::collections::HashSet<_> = connected.node_ids.iter().cloned().collect();
    for expected in &ids[1..=5] {
        assert!(reached.contains(expected), "node {expected} should be within 5 hops");
    }
    assert!(!reached.contains(&ids[6]), "node 6 is 6 hops away, beyond the clamped depth");

    let mut hop_by_node = std::collections::HashMap::new();
    for traversed in &connected.edges {
        hop_by_node
            .entry(traversed.edge.target_node_id.clone())
            .and_modify(|h: &mut u32| *h = (*h).min(traversed.hop_distance))
            .or_insert(traversed.hop_distance);
    }
    for (i, id) in ids.iter().enumerate().take(6).skip(1) {
        assert_eq!(hop_by_node.get(id).copied(), Some(i as u32), "node {i} should be exactly {i} hops out");
    }
}
