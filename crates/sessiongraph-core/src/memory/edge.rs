//! Edge type: a typed, directed link between two nodes.

use super::node::{EdgeCreator, EdgeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Per-hop confidence factor used by weighted bridge-path scoring
    /// (see `storage::sqlite::find_bridge_paths`); `1.0` when not supplied.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub created_by: EdgeCreator,
}

fn default_confidence() -> f64 {
    1.0
}
