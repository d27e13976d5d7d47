//! # sessiongraph-core
//!
//! Local-first knowledge-graph storage engine for AI-coding-session
//! analyses. A `Node` is one analyzed segment of a recorded coding session —
//! its classification, lessons, decisions, and observations — content-addressed
//! and versioned on disk, indexed in SQLite for structured listing, full-text
//! search, graph traversal, and (optionally) semantic/vector search.
//!
//! ## Storage model
//!
//! Every write lands in two places, in order: the versioned content store
//! (JSON records on disk, the durable source of truth) and the SQLite
//! relational index (a rebuildable projection over it — nodes, edges, FTS5,
//! and the `vec0` embedding table). See [`storage`] for the full breakdown.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sessiongraph_core::{Storage, StorageConfig};
//!
//! let config = StorageConfig::default_paths()?;
//! let storage = Storage::new(config)?;
//!
//! let node = storage.get_node("a1b2c3d4e5f60718", None)?;
//! let hits = storage.search("authentication", &[], &Default::default(), None, 0)?;
//! # Ok::<(), sessiongraph_core::StorageError>(())
//! ```
//!
//! ## Feature flags
//!
//! - `bundled-sqlite` (default): statically link SQLite via `rusqlite/bundled`.
//! - `encryption`: swap in SQLCipher (`rusqlite/bundled-sqlcipher`), mutually
//!   exclusive with `bundled-sqlite`. Reads the encryption key from the
//!   `SESSIONGRAPH_ENCRYPTION_KEY` environment variable.
//! - `embeddings` (default): enable the `node_embeddings`/`node_embeddings_vec`
//!   tables and [`storage::Storage::semantic_search`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

/// Content-addressed node/edge/lesson/quirk ids.
pub mod id;

/// Error type shared by every fallible public operation.
pub mod error;

/// Core data types: `Node`, `Edge`, and ingestion conversion.
pub mod memory;

/// The relational index, content store, graph engine, and search.
pub mod storage;

/// `EmbeddingProvider` and the embedding-text/serialization helpers.
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embedding;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use error::{Result, StorageError};

pub use memory::{
    convert, AgentOutput, Classification, Confidence, Content, DaemonDecisionRecord, DaemonMeta, Edge,
    EdgeCreator, EdgeType, ErrorSeen, Frequency, JobContext, KeyDecision, Lesson, LessonLevel,
    ModelQuirk, ModelUsage, Node, NodeMetadata, NodeSource, NodeType, Observations, Outcome,
    Segment, Semantic, Severity, ToolUseError,
};

pub use storage::{
    clamp_limit, ensure_vector_table, parse_record_path, validate_sort_field, AggregatedQuirk,
    AggregatedToolError, BackfillResult, BridgePath, ConnectedNodes, ContentStore, GraphPath,
    GraphStats, Highlight, HopDirection, Lesson as LessonRow, LevelSummary, ListOpts, ListResult,
    LessonFilters, NodeFilters, ParsedRecordPath, QuirkFilters, QuirkRow, SearchHit, SearchResult,
    SemanticHit, SemanticSearchOpts, SessionSummary, Storage, StorageConfig, Subgraph,
    ToolErrorRow, ToolErrorStats, ToolErrorTrend, TraversalDirection, TraversedEdge, FTS_FIELDS,
    MAX_BFS_DEPTH, MAX_PATH_DEPTH, SORT_FIELDS,
};

pub use embedding::{
    build_embedding_text, cosine_similarity, is_rich_embedding_format, EmbeddingProvider,
    EMBEDDING_FORMAT_VERSION,
};

pub use id::{decision_id, edge_id, is_valid_node_id, lesson_id, node_id, quirk_id, tool_error_id};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        EdgeType, EmbeddingProvider, Lesson, ListOpts, ListResult, Node, NodeFilters, NodeType,
        Outcome, Result, SearchResult, Storage, StorageConfig, StorageError,
    };
}
