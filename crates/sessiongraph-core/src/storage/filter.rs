//! The filter-to-SQL compiler.
//!
//! `NodeFilters` is the one typed record every listing/search/count path
//! builds its WHERE clause from. Compiling to `(fragment, params)` instead of
//! string-concatenating values keeps every caller parameterized — see
//! SPEC_FULL §9(b).

use rusqlite::types::Value as SqlValue;

/// Typed filter record for node listing/search/count.
#[derive(Debug, Clone, Default)]
pub struct NodeFilters {
    pub project: Option<String>,
    pub exact_project: Option<String>,
    pub node_type: Option<String>,
    pub outcome: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub computer: Option<String>,
    pub had_clear_goal: Option<bool>,
    pub is_new_project: Option<bool>,
    pub session_file: Option<String>,
    /// AND-semantics: a node must carry every tag listed (node tags ∪ lesson tags).
    pub tags: Vec<String>,
    /// AND-semantics over `topics`.
    pub topics: Vec<String>,
}

/// Allow-listed sort fields for `ORDER BY` (never interpolate a caller-supplied column name directly).
pub const SORT_FIELDS: &[&str] = &[
    "timestamp",
    "analyzed_at",
    "project",
    "type",
    "outcome",
    "tokens_used",
    "cost",
    "duration_minutes",
];

/// Validate a requested sort field against the allow-list, defaulting to
/// `timestamp` for anything unrecognized.
pub fn validate_sort_field(field: Option<&str>) -> &'static str {
    match field {
        Some(f) => SORT_FIELDS.iter().find(|s| **s == f).copied().unwrap_or("timestamp"),
        None => "timestamp",
    }
}

/// Clamp a caller-requested limit into `[1, max]`.
pub fn clamp_limit(limit: Option<i64>, max: i64) -> i64 {
    limit.unwrap_or(50).clamp(1, max)
}

/// Compile `filters` into a `WHERE` fragment (without the leading `WHERE`)
/// and its positional params, for interpolation after `nodes n`.
pub fn build_where(filters: &NodeFilters) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(p) = &filters.project {
        clauses.push("n.project LIKE ?".to_string());
        params.push(SqlValue::Text(format!("%{p}%")));
    }
    if let Some(p) = &filters.exact_project {
        clauses.push("n.project = ?".to_string());
        params.push(SqlValue::Text(p.clone()));
    }
    if let Some(t) = &filters.node_type {
        clauses.push("n.type = ?".to_string());
        params.push(SqlValue::Text(t.clone()));
    }
    if let Some(o) = &filters.outcome {
        clauses.push("n.outcome = ?".to_string());
        params.push(SqlValue::Text(o.clone()));
    }
    if let Some(from) = &filters.from {
        clauses.push("n.timestamp >= ?".to_string());
        params.push(SqlValue::Text(from.clone()));
    }
    if let Some(to) = &filters.to {
        clauses.push("n.timestamp <= ?".to_string());
        params.push(SqlValue::Text(to.clone()));
    }
    if let Some(c) = &filters.computer {
        clauses.push("n.computer = ?".to_string());
        params.push(SqlValue::Text(c.clone()));
    }
    if let Some(b) = filters.had_clear_goal {
        clauses.push("n.had_clear_goal = ?".to_string());
        params.push(SqlValue::Integer(b as i64));
    }
    if let Some(b) = filters.is_new_project {
        clauses.push("n.is_new_project = ?".to_string());
        params.push(SqlValue::Integer(b as i64));
    }
    if let Some(s) = &filters.session_file {
        clauses.push("n.session_file = ?".to_string());
        params.push(SqlValue::Text(s.clone()));
    }

    if !filters.tags.is_empty() {
        let placeholders = filters.tags.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        clauses.push(format!(
            "n.id IN (
                SELECT node_id FROM (
                    SELECT node_id, tag FROM tags
                    UNION
                    SELECT l.node_id, lt.tag FROM lesson_tags lt JOIN lessons l ON l.id = lt.lesson_id
                )
                WHERE tag IN ({placeholders})
                GROUP BY node_id
                HAVING COUNT(DISTINCT tag) = {}
            )",
            filters.tags.len()
        ));
        for t in &filters.tags {
            params.push(SqlValue::Text(t.clone()));
        }
    }

    if !filters.topics.is_empty() {
        let placeholders = filters.topics.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        clauses.push(format!(
            "n.id IN (
                SELECT node_id FROM topics
                WHERE topic IN ({placeholders})
                GROUP BY node_id
                HAVING COUNT(DISTINCT topic) = {}
            )",
            filters.topics.len()
        ));
        for t in &filters.topics {
            params.push(SqlValue::Text(t.clone()));
        }
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), params)
    } else {
        (clauses.join(" AND "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_match_everything() {
        let (sql, params) = build_where(&NodeFilters::default());
        assert_eq!(sql, "1 = 1");
        assert!(params.is_empty());
    }

    #[test]
    fn project_uses_like_with_wildcards() {
        let filters = NodeFilters {
            project: Some("crate".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_where(&filters);
        assert!(sql.contains("n.project LIKE ?"));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0], SqlValue::Text("%crate%".to_string()));
    }

    #[test]
    fn tags_require_count_equal_to_requested_tag_count() {
        let filters = NodeFilters {
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        let (sql, params) = build_where(&filters);
        assert!(sql.contains("HAVING COUNT(DISTINCT tag) = 2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn sort_field_unknown_defaults_to_timestamp() {
        assert_eq!(validate_sort_field(Some("'; DROP TABLE nodes; --")), "timestamp");
        assert_eq!(validate_sort_field(Some("cost")), "cost");
    }

    #[test]
    fn limit_clamps_to_range() {
        assert_eq!(clamp_limit(Some(0), 500), 1);
        assert_eq!(clamp_limit(Some(100_000), 500), 500);
        assert_eq!(clamp_limit(None, 500), 50);
    }
}
