//! Embedding record shape, the embedding-text builder, and the
//! `EmbeddingProvider` collaborator interface.
//!
//! The embedding model itself is an external collaborator (SPEC_FULL §6.3):
//! this crate never runs inference in-process. `EmbeddingProvider` is the
//! seam a caller implements (against a hosted API, a local ONNX runtime, a
//! test double, whatever they like) and passes into `Storage::backfill_embeddings`.

use crate::error::StorageError;
use crate::memory::Node;
use async_trait::async_trait;

/// Bumped whenever the embedding-text format changes in a way that should
/// invalidate previously stored embeddings. Appended as a trailing sentinel
/// paragraph to every embedding input so staleness is detectable without
/// comparing full text (`is_rich_embedding_format`).
pub const EMBEDDING_FORMAT_VERSION: &str = "embedding-format-v1";

/// An embedding model, injected by the caller. The core only ever calls
/// `embed`; it never loads a model itself.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored alongside each embedding so stale-model detection
    /// (`Storage::find_nodes_needing_embedding`) can tell a provider swap
    /// from a format-version bump.
    fn model_name(&self) -> &str;

    /// Fixed output dimension; must match the `node_embeddings_vec` table's
    /// configured dimension or every write will fail with `DimensionMismatch`.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts in one call. Implementations should batch at
    /// the transport layer themselves; this core only chunks by
    /// `backfill_batch_size`, it does not split a single call further.
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, StorageError>;
}

/// Build the text a node's embedding is computed over.
///
/// `"[type] summary"`, optionally followed by decision and lesson sections,
/// always terminated by the current format sentinel on its own paragraph.
pub fn build_embedding_text(node: &Node) -> String {
    let mut text = format!("[{}] {}", node.node_type, node.summary);

    if !node.key_decisions.is_empty() {
        text.push_str("\n\nDecisions:");
        for d in &node.key_decisions {
            text.push_str(&format!("\n- {} (why: {})", d.what, d.why));
        }
    }

    if !node.lessons.is_empty() {
        text.push_str("\n\nLessons:");
        for l in &node.lessons {
            text.push_str(&format!("\n- {}", l.summary));
        }
    }

    text.push_str(&format!("\n\n{EMBEDDING_FORMAT_VERSION}"));
    text
}

/// `true` iff the current format sentinel is present. Presence of section
/// headers alone is not sufficient — a node with no decisions/lessons and an
/// old-format embedding would otherwise look "rich" by accident.
pub fn is_rich_embedding_format(text: &str) -> bool {
    text.contains(EMBEDDING_FORMAT_VERSION)
}

/// Serialize a float32 vector as little-endian bytes for the `embedding` BLOB column.
pub fn serialize(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverse of `serialize`. Returns `Corrupt` if the byte length isn't a
/// multiple of 4 (a torn or hand-edited blob).
pub fn deserialize(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for a
/// zero-length or zero-magnitude input rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
