//! Storage Module
//!
//! SQLite-based storage layer with:
//! - A versioned content store on disk (`content_store`)
//! - The relational index and node CRUD (`sqlite`)
//! - Forward-only schema migrations (`migrations`)
//! - The filter-to-SQL compiler shared by listing/search/count (`filter`)
//! - Edge CRUD and structural auto-linking (`edges`)
//! - BFS/weighted graph traversal (`graph`)
//! - The listing/aggregation query layer (`query`)
//! - FTS5 full-text search (`search`)
//! - `sqlite-vec` semantic search + the embedding write path (`semantic`)

mod content_store;
mod edges;
mod filter;
mod graph;
mod migrations;
mod query;
mod search;
mod semantic;
mod sqlite;

pub use content_store::{parse_record_path, ContentStore, ParsedRecordPath};
pub use filter::{clamp_limit, validate_sort_field, NodeFilters, SORT_FIELDS};
pub use graph::{
    BridgePath, ConnectedNodes, GraphPath, HopDirection, Subgraph, TraversalDirection,
    TraversedEdge, MAX_BFS_DEPTH, MAX_PATH_DEPTH,
};
pub use migrations::{ensure_vector_table, MIGRATIONS};
pub use query::{
    AggregatedQuirk, AggregatedToolError, Lesson, LevelSummary, ListOpts, ListResult, LessonFilters,
    QuirkFilters, QuirkRow, SessionSummary, ToolErrorRow, ToolErrorStats, ToolErrorTrend,
};
pub use search::{Highlight, SearchHit, SearchResult, FTS_FIELDS};
pub use semantic::{BackfillResult, SemanticHit, SemanticSearchOpts};
pub use sqlite::{GraphStats, Storage, StorageConfig};
