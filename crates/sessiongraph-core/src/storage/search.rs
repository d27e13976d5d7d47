//! Full-text search over `nodes_fts` (SPEC_FULL §4.4): query building,
//! ranking, and per-field snippet extraction.

use crate::error::Result;
use crate::memory::Node;
use crate::storage::filter::{build_where, clamp_limit, NodeFilters};
use crate::storage::sqlite::{hydrate_node, row_to_node, Storage};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

/// FTS5 columns a caller may restrict a query to.
pub const FTS_FIELDS: &[&str] = &["summary", "decisions", "lessons", "tags", "topics"];

/// One highlighted match: the column it was found in, and a ~100-character
/// window of the original field content centered on the first matching token.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Highlight {
    pub field: String,
    pub snippet: String,
}

/// One search hit: the node plus its FTS rank (as `score`, lower-is-better
/// preserved by the caller's sort, not renormalized) and its highlights.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub node: Node,
    pub score: f64,
    pub highlights: Vec<Highlight>,
}

/// A page of search hits plus pagination echo, so a caller can render "N of
/// M" without a second round-trip through `count_search_results`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    pub results: Vec<SearchHit>,
    pub total: u64,
    pub limit: i64,
    pub offset: i64,
}

/// Quote every whitespace-delimited token so FTS5 special characters
/// (`"`, `*`, `:`, `(`, `)`) inside a query can never be interpreted as
/// query syntax. Empty or all-whitespace input becomes `None` (no results).
///
/// When `fields` is non-empty, each token is additionally scoped to that
/// column set via FTS5's `{col1 col2}:"term"` column-filter syntax.
fn build_match_query(query: &str, fields: &[&str]) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if tokens.is_empty() {
        return None;
    }
    if fields.is_empty() {
        Some(tokens.join(" "))
    } else {
        let scope = fields.join(" ");
        Some(
            tokens
                .into_iter()
                .map(|t| format!("{{{scope}}}:{t}"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// Cut a ~100-character window of `field` centered on the first
/// case-insensitive occurrence of any of `tokens`, preferring to break on a
/// word boundary within reach of the cut and prefixing/suffixing `...` when
/// truncated. Returns `None` if none of `tokens` occurs in `field`.
fn snippet(field: &str, tokens: &[String]) -> Option<String> {
    if field.is_empty() {
        return None;
    }
    let lower = field.to_lowercase();
    let hit_at = tokens
        .iter()
        .filter_map(|t| lower.find(&t.to_lowercase()))
        .min()?;

    const WINDOW: usize = 100;
    const REACH: usize = 15;

    let mut start = hit_at.saturating_sub(WINDOW / 2);
    let mut end = (hit_at + WINDOW / 2).min(field.len());

    // Snap to byte-boundary-safe, then nudge outward to a nearby space so we
    // don't split a word, as long as that space is within REACH.
    while start > 0 && !field.is_char_boundary(start) {
        start -= 1;
    }
    while end < field.len() && !field.is_char_boundary(end) {
        end += 1;
    }

    if start > 0 {
        if let Some(space) = field[start.saturating_sub(REACH)..start].rfind(' ') {
            start = start.saturating_sub(REACH) + space + 1;
        }
    }
    if end < field.len() {
        if let Some(space) = field[end..(end + REACH).min(field.len())].find(' ') {
            end += space;
        }
    }

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(field[start..end].trim());
    if end < field.len() {
        out.push_str("...");
    }
    Some(out)
}

impl Storage {
    /// Search `nodes_fts`, returning hits sorted by ascending native rank
    /// (lower is better), with `filters` narrowing the joined `nodes` rows.
    pub fn search(
        &self,
        query: &str,
        fields: &[&str],
        filters: &NodeFilters,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<SearchResult> {
        let limit = clamp_limit(limit, self.config().max_list_limit);
        let Some(match_query) = build_match_query(query, fields) else {
            return Ok(SearchResult { results: Vec::new(), total: 0, limit, offset });
        };

        let (where_sql, filter_params) = build_where(filters);
        self.with_reader(|conn| {
            let count_sql = format!(
                "SELECT COUNT(*) FROM nodes_fts JOIN nodes n ON n.id = nodes_fts.node_id
                 WHERE nodes_fts MATCH ?1 AND {where_sql}"
            );
            let mut count_params: Vec<SqlValue> = vec![SqlValue::Text(match_query.clone())];
            count_params.extend(filter_params.iter().cloned());
            let total: u64 = conn.query_row(&count_sql, params_from_iter(count_params.iter()), |r| r.get(0))?;

            let sql = format!(
                "SELECT n.*, nodes_fts.summary, nodes_fts.decisions, nodes_fts.lessons,
                        nodes_fts.tags, nodes_fts.topics, rank
                 FROM nodes_fts JOIN nodes n ON n.id = nodes_fts.node_id
                 WHERE nodes_fts MATCH ?1 AND {where_sql}
                 ORDER BY rank LIMIT ?{} OFFSET ?{}",
                filter_params.len() + 2,
                filter_params.len() + 3,
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut all_params = count_params.clone();
            all_params.push(SqlValue::Integer(limit));
            all_params.push(SqlValue::Integer(offset));

            let tokens: Vec<String> = query.split_whitespace().map(str::to_string).collect();
            let mut rows = stmt.query(params_from_iter(all_params.iter()))?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let node = hydrate_node(conn, row_to_node(row)?)?;
                let score: f64 = row.get("rank")?;
                let mut highlights = Vec::new();
                for (field, column) in [
                    ("summary", row.get::<_, String>("summary")?),
                    ("decisions", row.get::<_, String>("decisions")?),
                    ("lessons", row.get::<_, String>("lessons")?),
                    ("tags", row.get::<_, String>("tags")?),
                    ("topics", row.get::<_, String>("topics")?),
                ] {
                    if let Some(s) = snippet(&column, &tokens) {
                        highlights.push(Highlight { field: field.to_string(), snippet: s });
                    }
                }
                results.push(SearchHit { node, score, highlights });
            }
            Ok(SearchResult { results, total, limit, offset })
        })
    }

    /// Re-run only the COUNT half of [`Storage::search`], for callers that
    /// already hold a page of results and just need a fresh total.
    pub fn count_search_results(&self, query: &str, fields: &[&str], filters: &NodeFilters) -> Result<u64> {
        let Some(match_query) = build_match_query(query, fields) else {
            return Ok(0);
        };
        let (where_sql, filter_params) = build_where(filters);
        self.with_reader(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM nodes_fts JOIN nodes n ON n.id = nodes_fts.node_id
                 WHERE nodes_fts MATCH ?1 AND {where_sql}"
            );
            let mut params: Vec<SqlValue> = vec![SqlValue::Text(match_query)];
            params.extend(filter_params.iter().cloned());
            Ok(conn.query_row(&sql, params_from_iter(params.iter()), |r| r.get(0))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_support::sample_node;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let dir = TempDir::new().unwrap();
        (Storage::open_in_memory(dir.path().join("nodes")).unwrap(), dir)
    }

    #[test]
    fn empty_query_returns_no_results() {
        let (storage, _dir) = test_storage();
        let result = storage.search("", &[], &NodeFilters::default(), None, 0).unwrap();
        assert_eq!(result.total, 0);
        assert!(result.results.is_empty());
    }

    #[test]
    fn matches_summary_and_extracts_a_snippet() {
        let (storage, _dir) = test_storage();
        let mut node = sample_node("a1b2c3d4e5f60718", 1);
        node.summary = "refactored the authentication middleware for session handling".to_string();
        storage.create_node(&node).unwrap();

        let result = storage.search("authentication", &[], &NodeFilters::default(), None, 0).unwrap();
        assert_eq!(result.total, 1);
        let hit = &result.results[0];
        assert_eq!(hit.node.id, node.id);
        let summary_hit = hit.highlights.iter().find(|h| h.field == "summary").unwrap();
        assert!(summary_hit.snippet.to_lowercase().contains("authentication"));
    }

    #[test]
    fn field_scoped_query_excludes_matches_in_other_fields() {
        let (storage, _dir) = test_storage();
        let mut node = sample_node("a1b2c3d4e5f60718", 1);
        node.summary = "unrelated summary text".to_string();
        node.tags = vec!["widgets".to_string()];
        storage.create_node(&node).unwrap();

        let scoped = storage.search("widgets", &["summary"], &NodeFilters::default(), None, 0).unwrap();
        assert_eq!(scoped.total, 0);

        let unscoped = storage.search("widgets", &[], &NodeFilters::default(), None, 0).unwrap();
        assert_eq!(unscoped.total, 1);
    }

    #[test]
    fn special_characters_in_the_query_do_not_corrupt_the_match_expression() {
        let (storage, _dir) = test_storage();
        let mut node = sample_node("a1b2c3d4e5f60718", 1);
        node.summary = "handled a quoted \"value\" in input".to_string();
        storage.create_node(&node).unwrap();

        // A hostile query token must not break the MATCH syntax.
        let result = storage.search("quoted\" OR 1=1 --", &[], &NodeFilters::default(), None, 0);
        assert!(result.is_ok());
    }

    #[test]
    fn filters_narrow_search_results() {
        let (storage, _dir) = test_storage();
        let mut a = sample_node("a1b2c3d4e5f60718", 1);
        a.summary = "shared keyword alpha".to_string();
        a.project = "alpha".to_string();
        let mut b = sample_node("b2c3d4e5f6071829", 1);
        b.summary = "shared keyword beta".to_string();
        b.project = "beta".to_string();
        storage.create_node(&a).unwrap();
        storage.create_node(&b).unwrap();

        let filters = NodeFilters { exact_project: Some("alpha".to_string()), ..Default::default() };
        let result = storage.search("keyword", &[], &filters, None, 0).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.results[0].node.project, "alpha");
    }
}
