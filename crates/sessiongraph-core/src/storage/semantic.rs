//! Semantic (vector) search over `node_embeddings_vec` (SPEC_FULL §4.8):
//! kNN query against the `vec0` virtual table, and the embedding write path
//! that keeps the blob table (`node_embeddings`) and the vector table in
//! sync.
//!
//! The embedding model itself is never invoked from here — `embedding.rs`'s
//! `EmbeddingProvider` is the collaborator a caller supplies; this module
//! only owns the storage side of the contract.

use crate::embedding::{build_embedding_text, deserialize, is_rich_embedding_format, serialize, EmbeddingProvider};
use crate::error::{Result, StorageError};
use crate::memory::Node;
use crate::storage::filter::{build_where, NodeFilters};
use crate::storage::sqlite::{hydrate_node, row_to_node, Storage};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

/// One semantic-search hit: the node, its raw vector distance, and a
/// `(0, 1]` similarity score derived from it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SemanticHit {
    pub node: Node,
    pub distance: f64,
    pub score: f64,
}

/// Knobs for [`Storage::semantic_search`].
#[derive(Debug, Clone, Default)]
pub struct SemanticSearchOpts {
    pub limit: Option<i64>,
    pub max_distance: Option<f64>,
    pub filters: NodeFilters,
}

/// Progress callback passed to [`Storage::backfill_embeddings`]: `(processed, total)`.
pub type BackfillProgress<'a> = dyn FnMut(usize, usize) + 'a;

/// Outcome of [`Storage::backfill_embeddings`]: how many nodes were embedded
/// and which ones failed (a per-node provider failure doesn't abort the run).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BackfillResult {
    pub processed: usize,
    pub total: usize,
    pub failed_node_ids: Vec<String>,
}

/// Whether `err` is SQLite complaining that `node_embeddings_vec` (or the
/// `vec0` module backing it) doesn't exist, as opposed to a genuine query
/// error against a table that *is* present.
fn is_missing_vector_table(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => {
            msg.contains("no such table") || msg.contains("no such module")
        }
        _ => false,
    }
}

impl Storage {
    /// kNN search against `node_embeddings_vec`. Returns an empty result
    /// (never an error) if the vector table isn't present — the `embeddings`
    /// feature may be compiled out, or the table may not have been created
    /// yet on an older database.
    pub fn semantic_search(&self, query_vec: &[f32], opts: &SemanticSearchOpts) -> Result<Vec<SemanticHit>> {
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        let limit = opts.limit.unwrap_or(10).clamp(1, self.config().max_list_limit);
        let (where_sql, filter_params) = build_where(&opts.filters);
        let query_bytes = serialize(query_vec);

        let result = self.with_reader(|conn| {
            let sql = format!(
                "SELECT n.*, v.distance FROM node_embeddings_vec v
                 JOIN nodes n ON n.id = v.node_id
                 WHERE v.embedding MATCH ?1 AND k = ?2 AND {where_sql}
                 ORDER BY v.distance ASC"
            );
            let mut params: Vec<SqlValue> = vec![
                SqlValue::Blob(query_bytes.clone()),
                SqlValue::Integer(limit),
            ];
            params.extend(filter_params.iter().cloned());

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut hits = Vec::new();
            while let Some(row) = rows.next()? {
                let distance: f64 = row.get("distance")?;
                if opts.max_distance.is_some_and(|max| distance > max) {
                    continue;
                }
                let node = hydrate_node(conn, row_to_node(row)?)?;
                hits.push(SemanticHit { node, distance, score: 1.0 / (1.0 + distance) });
            }
            Ok(hits)
        });

        // A missing/misconfigured vec0 table degrades to an empty result
        // rather than propagating — any other SQL error (a bad filter
        // column, a malformed query) is a real failure and must surface.
        match result {
            Ok(hits) => Ok(hits),
            Err(StorageError::Database(ref e)) if is_missing_vector_table(e) => Ok(Vec::new()),
            Err(other) => Err(other),
        }
    }

    /// Find nodes whose stored embedding is closest to `node_id`'s own
    /// embedding, excluding `node_id` itself. Empty if the node has no
    /// embedding yet.
    pub fn find_similar_nodes(&self, node_id: &str, opts: &SemanticSearchOpts) -> Result<Vec<SemanticHit>> {
        let Some(vector) = self.get_embedding_vector(node_id)? else {
            return Ok(Vec::new());
        };
        // Fetch one extra slot so excluding the query node itself still
        // leaves `limit` results.
        let mut inner = opts.clone();
        inner.limit = Some(inner.limit.unwrap_or(10) + 1);
        let hits = self.semantic_search(&vector, &inner)?;
        Ok(hits
            .into_iter()
            .filter(|h| h.node.id != node_id)
            .take(opts.limit.unwrap_or(10) as usize)
            .collect())
    }

    fn get_embedding_vector(&self, node_id: &str) -> Result<Option<Vec<f32>>> {
        self.with_reader(|conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT embedding FROM node_embeddings WHERE node_id = ?1",
                    rusqlite::params![node_id],
                    |r| r.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            blob.map(|b| deserialize(&b)).transpose()
        })
    }

    /// Upsert `node_id`'s embedding into both the blob table and the vector
    /// table, in one transaction. A dimension mismatch against the
    /// configured vector table aborts the write and surfaces
    /// `DimensionMismatch` rather than silently truncating or padding.
    pub fn store_embedding_with_vec(
        &self,
        node_id: &str,
        vector: &[f32],
        model_name: &str,
        input_text: &str,
    ) -> Result<()> {
        if vector.len() != self.config().embedding_dimensions {
            return Err(StorageError::DimensionMismatch {
                expected: self.config().embedding_dimensions,
                actual: vector.len(),
            });
        }
        let bytes = serialize(vector);
        let now = chrono::Utc::now().to_rfc3339();

        self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO node_embeddings (node_id, model_name, dim, embedding, input_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(node_id) DO UPDATE SET
                    model_name = excluded.model_name, dim = excluded.dim,
                    embedding = excluded.embedding, input_text = excluded.input_text,
                    created_at = excluded.created_at",
                rusqlite::params![node_id, model_name, vector.len() as i64, bytes, input_text, now],
            )?;
            tx.execute("DELETE FROM node_embeddings_vec WHERE node_id = ?1", rusqlite::params![node_id])?;
            tx.execute(
                "INSERT INTO node_embeddings_vec (node_id, embedding) VALUES (?1, ?2)",
                rusqlite::params![node_id, bytes],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Nodes whose embedding is missing, stale (different `model_name` than
    /// `provider`), or in an outdated text format (missing the current
    /// sentinel) — regardless of recency. `force = true` returns every node.
    pub fn find_nodes_needing_embedding(&self, provider: &dyn EmbeddingProvider, force: bool) -> Result<Vec<Node>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT n.* FROM nodes n")?;
            let all_ids: Vec<Node> = stmt
                .query_map([], row_to_node)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut out = Vec::new();
            for row in all_ids {
                let node = hydrate_node(conn, row)?;
                if force {
                    out.push(node);
                    continue;
                }
                let existing: Option<(String, String)> = conn
                    .query_row(
                        "SELECT model_name, input_text FROM node_embeddings WHERE node_id = ?1",
                        rusqlite::params![node.id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                let needs = match existing {
                    None => true,
                    Some((model, text)) => model != provider.model_name() || !is_rich_embedding_format(&text),
                };
                if needs {
                    out.push(node);
                }
            }
            Ok(out)
        })
    }

    /// Stream `find_nodes_needing_embedding` (or every node, if `force`)
    /// through `provider` in batches of `backfill_batch_size`, storing each
    /// result via `store_embedding_with_vec`. A per-node embed or store
    /// failure is recorded in `failed_node_ids` and does not abort the run;
    /// `on_progress` is called once per batch with `(processed, total)`.
    pub async fn backfill_embeddings(
        &self,
        provider: &dyn EmbeddingProvider,
        force: bool,
        mut on_progress: Option<&mut BackfillProgress<'_>>,
    ) -> Result<BackfillResult> {
        let candidates = self.find_nodes_needing_embedding(provider, force)?;
        let total = candidates.len();
        let mut result = BackfillResult { processed: 0, total, failed_node_ids: Vec::new() };
        let batch_size = self.config().backfill_batch_size.max(1);

        for batch in candidates.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(build_embedding_text).collect();
            match provider.embed(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for ((node, vector), text) in batch.iter().zip(vectors).zip(texts) {
                        if let Err(e) =
                            self.store_embedding_with_vec(&node.id, &vector, provider.model_name(), &text)
                        {
                            tracing::warn!(node_id = %node.id, error = %e, "failed to store backfilled embedding");
                            result.failed_node_ids.push(node.id.clone());
                        }
                    }
                }
                Ok(_) => {
                    tracing::warn!(batch_len = batch.len(), "embedding provider returned a mismatched batch size");
                    result.failed_node_ids.extend(batch.iter().map(|n| n.id.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch_len = batch.len(), "embedding provider failed for batch");
                    result.failed_node_ids.extend(batch.iter().map(|n| n.id.clone()));
                }
            }
            result.processed += batch.len();
            if let Some(cb) = on_progress.as_mut() {
                cb(result.processed, result.total);
            }
        }

        Ok(result)
    }
}
