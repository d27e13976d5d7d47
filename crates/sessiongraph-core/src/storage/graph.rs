//! Graph traversal: connected-node BFS, subgraph extraction, shortest path,
//! ancestor/descendant walks, and weighted bridge-path discovery
//! (SPEC_FULL §4.7, §9(c)).

use crate::error::Result;
use crate::memory::{Edge, EdgeType};
use crate::storage::sqlite::Storage;
use rusqlite::params;
use std::collections::{HashSet, VecDeque};

/// Hop direction relative to the traversal root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopDirection {
    Outgoing,
    Incoming,
}

/// Which edges to follow from a node: its own outgoing edges, incoming
/// edges, or both. Distinct from `HopDirection`, which records which way a
/// given edge was actually traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalDirection {
    In,
    Out,
    #[default]
    Both,
}

/// One edge reached by a BFS, annotated with how far from the root it was
/// found and which way it points relative to the root.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TraversedEdge {
    pub edge: Edge,
    pub hop_distance: u32,
    pub direction: HopDirection,
}

/// `get_connected_nodes`'s result: every node reached (root excluded) and
/// the edges that reached them.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConnectedNodes {
    pub root_node_id: String,
    pub node_ids: Vec<String>,
    pub edges: Vec<TraversedEdge>,
}

/// `get_subgraph`'s result: every node within `depth` hops of any root
/// (roots included), plus the edges connecting them.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Subgraph {
    pub node_ids: Vec<String>,
    pub edges: Vec<Edge>,
}

/// A discovered path between two nodes, in traversal order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GraphPath {
    pub node_ids: Vec<String>,
    pub edge_ids: Vec<String>,
}

/// One weighted bridge path discovered by `find_bridge_paths`: a chain of
/// edges from a start node whose per-hop confidence/relevance product
/// exceeds the caller's threshold.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BridgePath {
    pub node_ids: Vec<String>,
    pub edge_ids: Vec<String>,
    pub score: f64,
    pub description: String,
}

/// `get_connected_nodes`'s default/max depth (SPEC_FULL §4.7).
pub const MAX_BFS_DEPTH: u32 = 5;
/// `find_path`'s max depth ceiling.
pub const MAX_PATH_DEPTH: u32 = 20;

fn clamp_depth(depth: Option<u32>, default: u32, max: u32) -> u32 {
    depth.unwrap_or(default).clamp(1, max)
}

impl Storage {
    /// BFS over edges reachable from `start`, per SPEC_FULL §4.7. `depth`
    /// clamps to `[1, 5]` (default 1); `direction` selects which edges are
    /// followed from each frontier node; `edge_types`, if given, restricts
    /// which edges are followed at all. Root is excluded from `node_ids`.
    pub fn get_connected_nodes(
        &self,
        start: &str,
        depth: Option<u32>,
        direction: TraversalDirection,
        edge_types: Option<&[EdgeType]>,
    ) -> Result<ConnectedNodes> {
        let depth = clamp_depth(depth, 1, MAX_BFS_DEPTH);
        self.with_reader(|conn| {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(start.to_string());
            let mut frontier: VecDeque<String> = VecDeque::new();
            frontier.push_back(start.to_string());

            let mut node_ids = Vec::new();
            let mut edges = Vec::new();
            let mut seen_edges: HashSet<String> = HashSet::new();

            for hop in 1..=depth {
                let current: Vec<String> = frontier.drain(..).collect();
                if current.is_empty() {
                    break;
                }
                for node_id in current {
                    for step in adjacent_edges(conn, &node_id, direction)? {
                        if let Some(types) = edge_types {
                            if !types.contains(&step.edge.edge_type) {
                                continue;
                            }
                        }
                        if seen_edges.insert(step.edge.id.clone()) {
                            let other = step.other_node_id.clone();
                            edges.push(TraversedEdge {
                                edge: step.edge,
                                hop_distance: hop,
                                direction: step.direction,
                            });
                            if visited.insert(other.clone()) {
                                node_ids.push(other.clone());
                                frontier.push_back(other);
                            }
                        }
                    }
                }
            }

            Ok(ConnectedNodes { root_node_id: start.to_string(), node_ids, edges })
        })
    }

    /// Union of per-root BFS results (roots included among the returned
    /// nodes, edges deduplicated by edge ID). Empty `root_ids` returns empty.
    pub fn get_subgraph(
        &self,
        root_ids: &[String],
        depth: Option<u32>,
        direction: TraversalDirection,
        edge_types: Option<&[EdgeType]>,
    ) -> Result<Subgraph> {
        if root_ids.is_empty() {
            return Ok(Subgraph::default());
        }
        let mut node_ids: Vec<String> = Vec::new();
        let mut seen_nodes: HashSet<String> = HashSet::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut seen_edges: HashSet<String> = HashSet::new();

        for root in root_ids {
            if seen_nodes.insert(root.clone()) {
                node_ids.push(root.clone());
            }
            let connected = self.get_connected_nodes(root, depth, direction, edge_types)?;
            for id in connected.node_ids {
                if seen_nodes.insert(id.clone()) {
                    node_ids.push(id);
                }
            }
            for traversed in connected.edges {
                if seen_edges.insert(traversed.edge.id.clone()) {
                    edges.push(traversed.edge);
                }
            }
        }

        Ok(Subgraph { node_ids, edges })
    }

    /// BFS shortest path from `start` to `end` over the undirected adjacency
    /// of edges. `max_depth` clamps to `[1, 20]`. `None` if no path exists
    /// within that many hops. `start == end` returns a single-node, no-edge
    /// path.
    pub fn find_path(&self, start: &str, end: &str, max_depth: Option<u32>) -> Result<Option<GraphPath>> {
        if start == end {
            return Ok(Some(GraphPath { node_ids: vec![start.to_string()], edge_ids: vec![] }));
        }
        let max_depth = clamp_depth(max_depth, MAX_PATH_DEPTH, MAX_PATH_DEPTH);
        self.with_reader(|conn| {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(start.to_string());
            let mut queue: VecDeque<(String, u32)> = VecDeque::new();
            queue.push_back((start.to_string(), 0));
            let mut predecessor: std::collections::HashMap<String, (String, String)> =
                std::collections::HashMap::new();

            while let Some((node_id, d)) = queue.pop_front() {
                if d >= max_depth {
                    continue;
                }
                for (neighbor, edge_id) in undirected_neighbors(conn, &node_id)? {
                    if visited.insert(neighbor.clone()) {
                        predecessor.insert(neighbor.clone(), (node_id.clone(), edge_id));
                        if neighbor == end {
                            return Ok(Some(reconstruct_path(start, end, &predecessor)));
                        }
                        queue.push_back((neighbor, d + 1));
                    }
                }
            }
            Ok(None)
        })
    }

    /// `get_connected_nodes` restricted to incoming edges — the nodes that
    /// led to `node_id`. Default depth 5 when not specified.
    pub fn get_ancestors(&self, node_id: &str, depth: Option<u32>) -> Result<ConnectedNodes> {
        self.get_connected_nodes(node_id, depth.or(Some(MAX_BFS_DEPTH)), TraversalDirection::In, None)
    }

    /// `get_connected_nodes` restricted to outgoing edges — the nodes
    /// `node_id` led to. Default depth 5 when not specified.
    pub fn get_descendants(&self, node_id: &str, depth: Option<u32>) -> Result<ConnectedNodes> {
        self.get_connected_nodes(node_id, depth.or(Some(MAX_BFS_DEPTH)), TraversalDirection::Out, None)
    }

    /// Weighted multi-source BFS discovery (SPEC_FULL §4.7): from each start
    /// node, walk outgoing edges, scoring each path as the product of
    /// per-hop `edge.confidence * target.relevance_score`, scaled by the
    /// start node's own `relevance_score`. Paths are cycle-free (a node
    /// never revisited on the same path) and pruned once their score drops
    /// below `min_score`. Returns the top `limit` paths by score,
    /// descending, each up to `max_depth` hops.
    pub fn find_bridge_paths(
        &self,
        starts: &[String],
        max_depth: u32,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<BridgePath>> {
        self.with_reader(|conn| {
            let mut results: Vec<BridgePath> = Vec::new();

            for start in starts {
                let start_relevance = node_relevance(conn, start)?.unwrap_or(1.0);
                // (node_ids, edge_ids, score, path_node_set)
                let mut queue: VecDeque<(Vec<String>, Vec<String>, f64, HashSet<String>)> =
                    VecDeque::new();
                queue.push_back((vec![start.clone()], vec![], start_relevance, {
                    let mut s = HashSet::new();
                    s.insert(start.clone());
                    s
                }));

                while let Some((nodes, edge_ids, score, on_path)) = queue.pop_front() {
                    let depth = edge_ids.len() as u32;
                    if depth >= max_depth {
                        continue;
                    }
                    let current = nodes.last().unwrap().clone();
                    for (target, edge_id, confidence) in outgoing_with_confidence(conn, &current)? {
                        if on_path.contains(&target) {
                            continue;
                        }
                        let target_relevance = node_relevance(conn, &target)?.unwrap_or(1.0);
                        let hop_score = score * confidence * target_relevance;
                        if hop_score < min_score {
                            continue;
                        }
                        let mut next_nodes = nodes.clone();
                        next_nodes.push(target.clone());
                        let mut next_edges = edge_ids.clone();
                        next_edges.push(edge_id);
                        let mut next_on_path = on_path.clone();
                        next_on_path.insert(target.clone());

                        results.push(BridgePath {
                            node_ids: next_nodes.clone(),
                            edge_ids: next_edges.clone(),
                            score: hop_score,
                            description: describe_bridge(conn, &next_nodes)?,
                        });
                        queue.push_back((next_nodes, next_edges, hop_score, next_on_path));
                    }
                }
            }

            results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
            results.truncate(limit);
            Ok(results)
        })
    }
}

struct AdjacentStep {
    edge: Edge,
    other_node_id: String,
    direction: HopDirection,
}

fn adjacent_edges(
    conn: &rusqlite::Connection,
    node_id: &str,
    direction: TraversalDirection,
) -> Result<Vec<AdjacentStep>> {
    let mut out = Vec::new();
    if matches!(direction, TraversalDirection::Out | TraversalDirection::Both) {
        let mut stmt = conn.prepare("SELECT * FROM edges WHERE source_node_id = ?1")?;
        let rows = stmt.query_map(params![node_id], crate::storage::edges::row_to_edge)?;
        for row in rows {
            let edge = row?;
            out.push(AdjacentStep {
                other_node_id: edge.target_node_id.clone(),
                direction: HopDirection::Outgoing,
                edge,
            });
        }
    }
    if matches!(direction, TraversalDirection::In | TraversalDirection::Both) {
        let mut stmt = conn.prepare("SELECT * FROM edges WHERE target_node_id = ?1")?;
        let rows = stmt.query_map(params![node_id], crate::storage::edges::row_to_edge)?;
        for row in rows {
            let edge = row?;
            out.push(AdjacentStep {
                other_node_id: edge.source_node_id.clone(),
                direction: HopDirection::Incoming,
                edge,
            });
        }
    }
    Ok(out)
}

fn undirected_neighbors(conn: &rusqlite::Connection, node_id: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT target_node_id, id FROM edges WHERE source_node_id = ?1
         UNION
         SELECT source_node_id, id FROM edges WHERE target_node_id = ?1",
    )?;
    let rows = stmt.query_map(params![node_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<(String, String)>>>()?)
}

fn outgoing_with_confidence(
    conn: &rusqlite::Connection,
    node_id: &str,
) -> Result<Vec<(String, String, f64)>> {
    let mut stmt =
        conn.prepare("SELECT target_node_id, id, confidence FROM edges WHERE source_node_id = ?1")?;
    let rows = stmt.query_map(params![node_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<(String, String, f64)>>>()?)
}

fn node_relevance(conn: &rusqlite::Connection, node_id: &str) -> Result<Option<f64>> {
    Ok(conn
        .query_row(
            "SELECT relevance_score FROM nodes WHERE id = ?1",
            params![node_id],
            |r| r.get(0),
        )
        .ok())
}

fn node_summary(conn: &rusqlite::Connection, node_id: &str) -> Result<String> {
    Ok(conn
        .query_row("SELECT summary FROM nodes WHERE id = ?1", params![node_id], |r| r.get(0))
        .unwrap_or_else(|_| node_id.to_string()))
}

fn describe_bridge(conn: &rusqlite::Connection, node_ids: &[String]) -> Result<String> {
    let from = node_ids.first().map(|s| s.as_str()).unwrap_or("");
    let to = node_ids.last().map(|s| s.as_str()).unwrap_or("");
    let from_summary = node_summary(conn, from)?;
    let to_summary = node_summary(conn, to)?;
    Ok(format!("\"{from_summary}\" leads to \"{to_summary}\""))
}

fn reconstruct_path(
    start: &str,
    end: &str,
    predecessor: &std::collections::HashMap<String, (String, String)>,
) -> GraphPath {
    let mut node_ids = vec![end.to_string()];
    let mut edge_ids = Vec::new();
    let mut current = end.to_string();
    while current != start {
        let (prev, edge_id) = predecessor.get(&current).expect("path reconstruction invariant");
        node_ids.push(prev.clone());
        edge_ids.push(edge_id.clone());
        current = prev.clone();
    }
    node_ids.reverse();
    edge_ids.reverse();
    GraphPath { node_ids, edge_ids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_support::sample_node;
    use crate::memory::{Edge, EdgeCreator, EdgeType};
    use tempfile::TempDir;

    fn chain_storage() -> (Storage, TempDir, Vec<String>) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open_in_memory(dir.path().join("nodes")).unwrap();
        let ids = vec![
            "a1b2c3d4e5f60718".to_string(),
            "b2c3d4e5f6071829".to_string(),
            "c3d4e5f607182930".to_string(),
            "d4e5f60718293041".to_string(),
        ];
        for id in &ids {
            storage.create_node(&sample_node(id, 1)).unwrap();
        }
        for pair in ids.windows(2) {
            storage
                .create_edge(&Edge {
                    id: String::new(),
                    source_node_id: pair[0].clone(),
                    target_node_id: pair[1].clone(),
                    edge_type: EdgeType::Continuation,
                    metadata: serde_json::json!({}),
                    confidence: 1.0,
                    created_at: chrono::Utc::now(),
                    created_by: EdgeCreator::Daemon,
                })
                .unwrap();
        }
        (storage, dir, ids)
    }

    #[test]
    fn connected_nodes_respects_depth() {
        let (storage, _dir, ids) = chain_storage();
        let within_one = storage
            .get_connected_nodes(&ids[0], Some(1), TraversalDirection::Both, None)
            .unwrap();
        assert_eq!(within_one.node_ids, vec![ids[1].clone()]);

        let within_two = storage
            .get_connected_nodes(&ids[0], Some(2), TraversalDirection::Both, None)
            .unwrap();
        assert_eq!(within_two.node_ids.len(), 2);
    }

    #[test]
    fn depth_clamps_to_max_bfs_depth() {
        let (storage, _dir, ids) = chain_storage();
        let unclamped = storage
            .get_connected_nodes(&ids[0], Some(1_000_000), TraversalDirection::Both, None)
            .unwrap();
        assert_eq!(unclamped.node_ids.len(), ids.len() - 1);
    }

    #[test]
    fn find_path_returns_shortest_chain() {
        let (storage, _dir, ids) = chain_storage();
        let path = storage.find_path(&ids[0], &ids[3], None).unwrap().unwrap();
        assert_eq!(path.node_ids, ids);
        assert_eq!(path.edge_ids.len(), 3);
    }

    #[test]
    fn find_path_returns_none_when_disconnected() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open_in_memory(dir.path().join("nodes")).unwrap();
        storage.create_node(&sample_node("a1b2c3d4e5f60718", 1)).unwrap();
        storage.create_node(&sample_node("b2c3d4e5f6071829", 1)).unwrap();
        let path = storage
            .find_path("a1b2c3d4e5f60718", "b2c3d4e5f6071829", None)
            .unwrap();
        assert!(path.is_none());
    }

    #[test]
    fn find_path_same_node_is_trivial() {
        let (storage, _dir, ids) = chain_storage();
        let path = storage.find_path(&ids[0], &ids[0], None).unwrap().unwrap();
        assert_eq!(path.node_ids, vec![ids[0].clone()]);
        assert!(path.edge_ids.is_empty());
    }

    #[test]
    fn ancestors_and_descendants_are_directional() {
        let (storage, _dir, ids) = chain_storage();
        let descendants = storage.get_descendants(&ids[0], None).unwrap();
        assert_eq!(descendants.node_ids.len(), 3);
        let ancestors = storage.get_ancestors(&ids[3], None).unwrap();
        assert_eq!(ancestors.node_ids.len(), 3);
        assert!(storage.get_ancestors(&ids[0], None).unwrap().node_ids.is_empty());
    }

    #[test]
    fn get_subgraph_unions_multiple_roots_and_includes_them() {
        let (storage, _dir, ids) = chain_storage();
        let sub = storage
            .get_subgraph(&[ids[0].clone(), ids[2].clone()], Some(1), TraversalDirection::Both, None)
            .unwrap();
        assert!(sub.node_ids.contains(&ids[0]));
        assert!(sub.node_ids.contains(&ids[2]));
        assert!(sub.node_ids.contains(&ids[1]));
        assert!(sub.node_ids.contains(&ids[3]));
    }

    #[test]
    fn get_subgraph_empty_roots_is_empty() {
        let (storage, _dir, _ids) = chain_storage();
        let sub = storage.get_subgraph(&[], Some(1), TraversalDirection::Both, None).unwrap();
        assert!(sub.node_ids.is_empty());
        assert!(sub.edges.is_empty());
    }

    #[test]
    fn find_bridge_paths_scores_by_confidence_times_relevance() {
        let (storage, _dir, ids) = chain_storage();
        let paths = storage.find_bridge_paths(&[ids[0].clone()], 3, 0.0, 10).unwrap();
        assert!(!paths.is_empty());
        // Every sample node has relevance_score 1.0 and edge confidence 1.0,
        // so every discovered path should score exactly 1.0.
        for path in &paths {
            assert!((path.score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn find_bridge_paths_prunes_below_min_score() {
        let (storage, _dir, ids) = chain_storage();
        let paths = storage.find_bridge_paths(&[ids[0].clone()], 3, 2.0, 10).unwrap();
        assert!(paths.is_empty());
    }
}
