//! The listing/aggregation query layer (SPEC_FULL §4.9): plain node listing
//! plus per-entity-kind rollups (lessons, quirks, tool errors, sessions,
//! taxonomy values).

use crate::error::Result;
use crate::memory::{Confidence, Frequency, LessonLevel, Node, Severity};
use crate::storage::filter::{build_where, clamp_limit, validate_sort_field, NodeFilters};
use crate::storage::sqlite::{hydrate_node, row_to_node, Storage};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;

/// Pagination + sort knobs shared by every listing call.
#[derive(Debug, Clone, Default)]
pub struct ListOpts {
    pub limit: Option<i64>,
    pub offset: i64,
    pub sort_by: Option<String>,
    pub descending: bool,
}

/// A page of results plus the total match count (pre-pagination), so
/// callers can render "N of M" without a second round-trip.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Filters for [`Storage::list_lessons`].
#[derive(Debug, Clone, Default)]
pub struct LessonFilters {
    pub level: Option<LessonLevel>,
    pub project: Option<String>,
    /// AND-semantics over the lesson's own tags.
    pub tags: Vec<String>,
    pub confidence: Option<Confidence>,
}

/// Filters for [`Storage::list_quirks`]. `min_frequency` ranks via
/// [`Frequency::at_least`] — "in the set of frequencies with rank ≥ requested".
#[derive(Debug, Clone, Default)]
pub struct QuirkFilters {
    pub model: Option<String>,
    pub min_frequency: Option<Frequency>,
    pub severity: Option<Severity>,
    pub project: Option<String>,
}

/// A lesson joined with the `node_id` it belongs to, for cross-node listing
/// (`Node::lessons` only holds a node's own lessons).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Lesson {
    pub id: String,
    pub node_id: String,
    pub level: LessonLevel,
    pub summary: String,
    pub details: String,
    pub confidence: Confidence,
    pub actionable: Option<bool>,
}

/// `getLessonsByLevel`'s per-level rollup: how many lessons at that level,
/// and the `recent_limit` most recent of them.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LevelSummary {
    pub count: u64,
    pub recent: Vec<Lesson>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QuirkRow {
    pub id: String,
    pub node_id: String,
    pub model: String,
    pub observation: String,
    pub frequency: Frequency,
    pub workaround: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolErrorRow {
    pub id: String,
    pub node_id: String,
    pub tool: String,
    pub error_type: String,
    pub context: String,
    pub model: Option<String>,
    pub was_retried: bool,
}

/// An aggregated model quirk: one observation pattern, with how many nodes
/// recorded it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatedQuirk {
    pub model: String,
    pub observation: String,
    pub occurrence_count: u64,
    pub max_severity: String,
}

/// An aggregated tool error: one `(tool, error_type)` pattern across nodes,
/// optionally further split by `model` when `group_by_model` is requested.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatedToolError {
    pub tool: String,
    pub error_type: String,
    pub model: Option<String>,
    pub occurrence_count: u64,
    pub retried_count: u64,
}

/// `getToolErrorStats`'s per-tool rollup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolErrorToolStat {
    pub tool: String,
    pub error_count: u64,
    pub retried_count: u64,
    pub distinct_error_types: u64,
}

/// `getToolErrorStats`'s per-model rollup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolErrorModelStat {
    pub model: Option<String>,
    pub error_count: u64,
}

/// Week-over-week error-rate trend, relative to the moment the query runs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolErrorTrend {
    pub this_week: u64,
    pub last_week: u64,
    /// `(this_week - last_week) / last_week`; `0.0` when `last_week` is zero.
    pub change: f64,
}

/// `getToolErrorStats`'s combined report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolErrorStats {
    pub by_tool: Vec<ToolErrorToolStat>,
    pub by_model: Vec<ToolErrorModelStat>,
    pub trend: ToolErrorTrend,
}

/// One row of `get_session_summaries`, keyed by `session_file` (not the
/// free-form `session_id`, which is not guaranteed unique across re-runs).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub session_file: String,
    pub node_count: u64,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub types: Vec<String>,
    pub success_count: u64,
    pub partial_count: u64,
    pub failed_count: u64,
    pub abandoned_count: u64,
    pub first_node_summary: String,
    pub first_node_type: String,
}

fn lesson_where(filters: &LessonFilters) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(level) = filters.level {
        clauses.push("l.level = ?".to_string());
        params.push(SqlValue::Text(level.as_str().to_string()));
    }
    if let Some(project) = &filters.project {
        clauses.push("n.project LIKE ?".to_string());
        params.push(SqlValue::Text(format!("%{project}%")));
    }
    if let Some(confidence) = filters.confidence {
        clauses.push("l.confidence = ?".to_string());
        params.push(SqlValue::Text(confidence.as_str().to_string()));
    }
    if !filters.tags.is_empty() {
        let placeholders = filters.tags.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        clauses.push(format!(
            "l.id IN (SELECT lesson_id FROM lesson_tags WHERE tag IN ({placeholders})
              GROUP BY lesson_id HAVING COUNT(DISTINCT tag) = {})",
            filters.tags.len()
        ));
        params.extend(filters.tags.iter().cloned().map(SqlValue::Text));
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), params)
    } else {
        (clauses.join(" AND "), params)
    }
}

fn quirk_where(filters: &QuirkFilters) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(model) = &filters.model {
        clauses.push("q.model = ?".to_string());
        params.push(SqlValue::Text(model.clone()));
    }
    if let Some(severity) = filters.severity {
        clauses.push("q.severity = ?".to_string());
        params.push(SqlValue::Text(severity.as_str().to_string()));
    }
    if let Some(project) = &filters.project {
        clauses.push("n.project LIKE ?".to_string());
        params.push(SqlValue::Text(format!("%{project}%")));
    }
    if let Some(min_frequency) = filters.min_frequency {
        let allowed = min_frequency.at_least();
        let placeholders = allowed.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        clauses.push(format!("q.frequency IN ({placeholders})"));
        params.extend(allowed.iter().map(|f| SqlValue::Text(f.as_str().to_string())));
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), params)
    } else {
        (clauses.join(" AND "), params)
    }
}

impl Storage {
    /// List nodes matching `filters`, paginated and sorted per `opts`.
    pub fn list_nodes(&self, filters: &NodeFilters, opts: &ListOpts) -> Result<ListResult<Node>> {
        let (where_sql, where_params) = build_where(filters);
        let sort_field = validate_sort_field(opts.sort_by.as_deref());
        let direction = if opts.descending { "DESC" } else { "ASC" };
        let limit = clamp_limit(opts.limit, self.config().max_list_limit);

        self.with_reader(|conn| {
            let total: u64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM nodes n WHERE {where_sql}"),
                params_from_iter(where_params.iter()),
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT n.* FROM nodes n WHERE {where_sql} ORDER BY n.{sort_field} {direction} LIMIT ?{} OFFSET ?{}",
                where_params.len() + 1,
                where_params.len() + 2,
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut all_params = where_params.clone();
            all_params.push(SqlValue::Integer(limit));
            all_params.push(SqlValue::Integer(opts.offset));

            let rows = stmt.query_map(params_from_iter(all_params.iter()), row_to_node)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(hydrate_node(conn, row?)?);
            }
            Ok(ListResult { items, total })
        })
    }

    pub fn count_nodes(&self, filters: &NodeFilters) -> Result<u64> {
        Ok(self.list_nodes(filters, &ListOpts { limit: Some(1), ..Default::default() })?.total)
    }

    fn lesson_row(r: &rusqlite::Row) -> rusqlite::Result<Lesson> {
        Ok(Lesson {
            id: r.get(0)?,
            node_id: r.get(1)?,
            level: LessonLevel::parse_name(&r.get::<_, String>(2)?),
            summary: r.get(3)?,
            details: r.get(4)?,
            confidence: Confidence::parse_name(&r.get::<_, String>(5)?),
            actionable: r.get(6)?,
        })
    }

    /// Every lesson matching `filters`, paginated and ordered by
    /// `created_at DESC, id DESC`.
    pub fn list_lessons(&self, filters: &LessonFilters, opts: &ListOpts) -> Result<ListResult<Lesson>> {
        let (where_sql, where_params) = lesson_where(filters);
        let limit = clamp_limit(opts.limit, self.config().max_list_limit);

        self.with_reader(|conn| {
            let total: u64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM lessons l JOIN nodes n ON n.id = l.node_id WHERE {where_sql}"),
                params_from_iter(where_params.iter()),
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT l.id, l.node_id, l.level, l.summary, l.details, l.confidence, l.actionable
                 FROM lessons l JOIN nodes n ON n.id = l.node_id
                 WHERE {where_sql}
                 ORDER BY l.created_at DESC, l.id DESC
                 LIMIT ?{} OFFSET ?{}",
                where_params.len() + 1,
                where_params.len() + 2,
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut all_params = where_params.clone();
            all_params.push(SqlValue::Integer(limit));
            all_params.push(SqlValue::Integer(opts.offset));
            let items = stmt
                .query_map(params_from_iter(all_params.iter()), Self::lesson_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ListResult { items, total })
        })
    }

    pub fn count_lessons(&self, filters: &LessonFilters) -> Result<u64> {
        Ok(self.list_lessons(filters, &ListOpts { limit: Some(1), ..Default::default() })?.total)
    }

    /// Every lesson level, each with its lesson count and the `recent_limit`
    /// most recently created lessons at that level.
    pub fn get_lessons_by_level(&self, recent_limit: u32) -> Result<HashMap<LessonLevel, LevelSummary>> {
        self.with_reader(|conn| {
            let mut out = HashMap::new();
            for &level in LessonLevel::ALL.iter() {
                let count: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM lessons WHERE level = ?1",
                    rusqlite::params![level.as_str()],
                    |r| r.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT id, node_id, level, summary, details, confidence, actionable
                     FROM lessons WHERE level = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
                )?;
                let recent = stmt
                    .query_map(rusqlite::params![level.as_str(), recent_limit], Self::lesson_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out.insert(level, LevelSummary { count, recent });
            }
            Ok(out)
        })
    }

    /// Every model quirk matching `filters`, paginated and ordered by
    /// `created_at DESC, id DESC`.
    pub fn list_quirks(&self, filters: &QuirkFilters, opts: &ListOpts) -> Result<ListResult<QuirkRow>> {
        let (where_sql, where_params) = quirk_where(filters);
        let limit = clamp_limit(opts.limit, self.config().max_list_limit);

        self.with_reader(|conn| {
            let total: u64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM model_quirks q JOIN nodes n ON n.id = q.node_id WHERE {where_sql}"),
                params_from_iter(where_params.iter()),
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT q.id, q.node_id, q.model, q.observation, q.frequency, q.workaround, q.severity
                 FROM model_quirks q JOIN nodes n ON n.id = q.node_id
                 WHERE {where_sql}
                 ORDER BY q.created_at DESC, q.id DESC
                 LIMIT ?{} OFFSET ?{}",
                where_params.len() + 1,
                where_params.len() + 2,
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut all_params = where_params.clone();
            all_params.push(SqlValue::Integer(limit));
            all_params.push(SqlValue::Integer(opts.offset));
            let items = stmt
                .query_map(params_from_iter(all_params.iter()), |r| {
                    Ok(QuirkRow {
                        id: r.get(0)?,
                        node_id: r.get(1)?,
                        model: r.get(2)?,
                        observation: r.get(3)?,
                        frequency: Frequency::parse_name(&r.get::<_, String>(4)?),
                        workaround: r.get(5)?,
                        severity: Severity::parse_name(&r.get::<_, String>(6)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ListResult { items, total })
        })
    }

    pub fn count_quirks(&self, filters: &QuirkFilters) -> Result<u64> {
        Ok(self.list_quirks(filters, &ListOpts { limit: Some(1), ..Default::default() })?.total)
    }

    pub fn get_quirks_by_model(&self, model: &str) -> Result<Vec<QuirkRow>> {
        let filters = QuirkFilters { model: Some(model.to_string()), ..Default::default() };
        Ok(self
            .list_quirks(&filters, &ListOpts { limit: Some(self.config().max_list_limit), ..Default::default() })?
            .items)
    }

    pub fn get_all_quirk_models(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT model FROM model_quirks ORDER BY model")?;
            Ok(stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?)
        })
    }

    /// Distinct `(model, observation)` quirk patterns occurring at least
    /// `min_occurrences` times, with the highest severity recorded for each.
    pub fn get_aggregated_quirks(&self, min_occurrences: u64) -> Result<Vec<AggregatedQuirk>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model, observation, COUNT(*), MAX(
                    CASE severity WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END
                 )
                 FROM model_quirks
                 GROUP BY model, observation
                 HAVING COUNT(*) >= ?1
                 ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map(rusqlite::params![min_occurrences as i64], |r| {
                let rank: i64 = r.get(3)?;
                let severity = match rank {
                    2 => "high",
                    1 => "medium",
                    _ => "low",
                };
                Ok(AggregatedQuirk {
                    model: r.get(0)?,
                    observation: r.get(1)?,
                    occurrence_count: r.get::<_, i64>(2)? as u64,
                    max_severity: severity.to_string(),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Every tool error, optionally restricted to one tool, paginated.
    pub fn list_tool_errors(&self, tool: Option<&str>, opts: &ListOpts) -> Result<ListResult<ToolErrorRow>> {
        let limit = clamp_limit(opts.limit, self.config().max_list_limit);
        self.with_reader(|conn| {
            let where_sql = if tool.is_some() { "tool = ?1" } else { "1 = 1" };
            let total: u64 = if let Some(t) = tool {
                conn.query_row(
                    &format!("SELECT COUNT(*) FROM tool_errors WHERE {where_sql}"),
                    rusqlite::params![t],
                    |r| r.get(0),
                )?
            } else {
                conn.query_row("SELECT COUNT(*) FROM tool_errors", [], |r| r.get(0))?
            };

            let sql = format!(
                "SELECT id, node_id, tool, error_type, context, model, was_retried FROM tool_errors
                 WHERE {where_sql} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
                if tool.is_some() { 2 } else { 1 },
                if tool.is_some() { 3 } else { 2 },
            );
            let mut stmt = conn.prepare(&sql)?;
            let map_row = |r: &rusqlite::Row| {
                Ok(ToolErrorRow {
                    id: r.get(0)?,
                    node_id: r.get(1)?,
                    tool: r.get(2)?,
                    error_type: r.get(3)?,
                    context: r.get(4)?,
                    model: r.get(5)?,
                    was_retried: r.get(6)?,
                })
            };
            let items = if let Some(t) = tool {
                stmt.query_map(rusqlite::params![t, limit, opts.offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            } else {
                stmt.query_map(rusqlite::params![limit, opts.offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            Ok(ListResult { items, total })
        })
    }

    pub fn count_tool_errors(&self, tool: Option<&str>) -> Result<u64> {
        Ok(self.list_tool_errors(tool, &ListOpts { limit: Some(1), ..Default::default() })?.total)
    }

    /// Distinct `(tool, error_type)` failure patterns, each further split by
    /// `model` when `group_by_model` is requested.
    pub fn get_aggregated_tool_errors(&self, group_by_model: bool) -> Result<Vec<AggregatedToolError>> {
        self.with_reader(|conn| {
            if group_by_model {
                let mut stmt = conn.prepare(
                    "SELECT tool, error_type, model, COUNT(*), SUM(was_retried)
                     FROM tool_errors GROUP BY tool, error_type, model ORDER BY COUNT(*) DESC",
                )?;
                let rows = stmt.query_map([], |r| {
                    Ok(AggregatedToolError {
                        tool: r.get(0)?,
                        error_type: r.get(1)?,
                        model: r.get(2)?,
                        occurrence_count: r.get::<_, i64>(3)? as u64,
                        retried_count: r.get::<_, i64>(4)? as u64,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            } else {
                let mut stmt = conn.prepare(
                    "SELECT tool, error_type, COUNT(*), SUM(was_retried)
                     FROM tool_errors GROUP BY tool, error_type ORDER BY COUNT(*) DESC",
                )?;
                let rows = stmt.query_map([], |r| {
                    Ok(AggregatedToolError {
                        tool: r.get(0)?,
                        error_type: r.get(1)?,
                        model: None,
                        occurrence_count: r.get::<_, i64>(2)? as u64,
                        retried_count: r.get::<_, i64>(3)? as u64,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        })
    }

    /// Combined tool-error report: per-tool rollup, per-model rollup, and a
    /// week-over-week trend relative to now.
    pub fn get_tool_error_stats(&self) -> Result<ToolErrorStats> {
        self.with_reader(|conn| {
            let mut tool_stmt = conn.prepare(
                "SELECT tool, COUNT(*), SUM(was_retried), COUNT(DISTINCT error_type)
                 FROM tool_errors GROUP BY tool ORDER BY COUNT(*) DESC",
            )?;
            let by_tool = tool_stmt
                .query_map([], |r| {
                    Ok(ToolErrorToolStat {
                        tool: r.get(0)?,
                        error_count: r.get::<_, i64>(1)? as u64,
                        retried_count: r.get::<_, i64>(2)? as u64,
                        distinct_error_types: r.get::<_, i64>(3)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut model_stmt =
                conn.prepare("SELECT model, COUNT(*) FROM tool_errors GROUP BY model ORDER BY COUNT(*) DESC")?;
            let by_model = model_stmt
                .query_map([], |r| Ok(ToolErrorModelStat { model: r.get(0)?, error_count: r.get::<_, i64>(1)? as u64 }))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let now = chrono::Utc::now();
            let week_ago = (now - chrono::Duration::days(7)).to_rfc3339();
            let two_weeks_ago = (now - chrono::Duration::days(14)).to_rfc3339();
            let this_week: u64 = conn.query_row(
                "SELECT COUNT(*) FROM tool_errors WHERE created_at >= ?1",
                rusqlite::params![week_ago],
                |r| r.get(0),
            )?;
            let last_week: u64 = conn.query_row(
                "SELECT COUNT(*) FROM tool_errors WHERE created_at >= ?1 AND created_at < ?2",
                rusqlite::params![two_weeks_ago, week_ago],
                |r| r.get(0),
            )?;
            let change = if last_week == 0 {
                0.0
            } else {
                (this_week as f64 - last_week as f64) / last_week as f64
            };

            Ok(ToolErrorStats { by_tool, by_model, trend: ToolErrorTrend { this_week, last_week, change } })
        })
    }

    /// Per-session rollup keyed by `session_file`: node/token/cost totals,
    /// distinct node types, per-outcome counts, and the earliest node's
    /// summary/type. `project`, when given, is matched with the same `LIKE`
    /// semantics as [`NodeFilters::project`].
    pub fn get_session_summaries(&self, project: Option<&str>, opts: &ListOpts) -> Result<ListResult<SessionSummary>> {
        let limit = clamp_limit(opts.limit, self.config().max_list_limit);
        let project_clause = if project.is_some() { "project LIKE ?1" } else { "1 = 1" };

        self.with_reader(|conn| {
            let total: u64 = if let Some(p) = project {
                conn.query_row(
                    &format!("SELECT COUNT(DISTINCT session_file) FROM nodes WHERE {project_clause}"),
                    rusqlite::params![format!("%{p}%")],
                    |r| r.get(0),
                )?
            } else {
                conn.query_row("SELECT COUNT(DISTINCT session_file) FROM nodes", [], |r| r.get(0))?
            };

            let sql = format!(
                "WITH ranked AS (
                    SELECT *, ROW_NUMBER() OVER (
                        PARTITION BY session_file ORDER BY timestamp ASC, segment_end ASC
                    ) AS rn
                    FROM nodes WHERE {project_clause}
                 ),
                 first_node AS (
                    SELECT session_file, summary AS first_summary, type AS first_type FROM ranked WHERE rn = 1
                 ),
                 agg AS (
                    SELECT session_file,
                           COUNT(*) AS node_count,
                           MIN(timestamp) AS first_timestamp,
                           MAX(timestamp) AS last_timestamp,
                           SUM(tokens_used) AS total_tokens,
                           SUM(cost) AS total_cost,
                           GROUP_CONCAT(DISTINCT type) AS types,
                           SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END) AS success_count,
                           SUM(CASE WHEN outcome = 'partial' THEN 1 ELSE 0 END) AS partial_count,
                           SUM(CASE WHEN outcome = 'failed' THEN 1 ELSE 0 END) AS failed_count,
                           SUM(CASE WHEN outcome = 'abandoned' THEN 1 ELSE 0 END) AS abandoned_count
                    FROM nodes WHERE {project_clause}
                    GROUP BY session_file
                 )
                 SELECT agg.session_file, agg.node_count, agg.first_timestamp, agg.last_timestamp,
                        agg.total_tokens, agg.total_cost, agg.types,
                        agg.success_count, agg.partial_count, agg.failed_count, agg.abandoned_count,
                        first_node.first_summary, first_node.first_type
                 FROM agg JOIN first_node ON first_node.session_file = agg.session_file
                 ORDER BY agg.last_timestamp DESC
                 LIMIT ?{} OFFSET ?{}",
                if project.is_some() { 2 } else { 1 },
                if project.is_some() { 3 } else { 2 },
            );
            let mut stmt = conn.prepare(&sql)?;
            let map_row = |r: &rusqlite::Row| {
                let types_csv: String = r.get(6)?;
                Ok(SessionSummary {
                    session_file: r.get(0)?,
                    node_count: r.get::<_, i64>(1)? as u64,
                    first_timestamp: r.get(2)?,
                    last_timestamp: r.get(3)?,
                    total_tokens: r.get::<_, i64>(4)? as u64,
                    total_cost: r.get(5)?,
                    types: types_csv.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect(),
                    success_count: r.get::<_, i64>(7)? as u64,
                    partial_count: r.get::<_, i64>(8)? as u64,
                    failed_count: r.get::<_, i64>(9)? as u64,
                    abandoned_count: r.get::<_, i64>(10)? as u64,
                    first_node_summary: r.get(11)?,
                    first_node_type: r.get(12)?,
                })
            };
            let items = if let Some(p) = project {
                stmt.query_map(rusqlite::params![format!("%{p}%"), limit, opts.offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            } else {
                stmt.query_map(rusqlite::params![limit, opts.offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            Ok(ListResult { items, total })
        })
    }

    pub fn get_all_projects(&self) -> Result<Vec<String>> {
        self.distinct_values("project")
    }

    pub fn get_all_node_types(&self) -> Result<Vec<String>> {
        self.distinct_values("type")
    }

    pub fn get_all_computers(&self) -> Result<Vec<String>> {
        self.distinct_values("computer")
    }

    /// Union of node tags and lesson tags, distinct and sorted.
    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT tag FROM (
                    SELECT tag FROM tags
                    UNION
                    SELECT tag FROM lesson_tags
                 ) ORDER BY tag",
            )?;
            Ok(stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?)
        })
    }

    pub fn get_all_topics(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT topic FROM topics ORDER BY topic")?;
            Ok(stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?)
        })
    }

    pub fn get_all_tools_with_errors(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT tool FROM tool_errors ORDER BY tool")?;
            Ok(stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?)
        })
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT {column} FROM nodes WHERE {column} != '' ORDER BY {column}"
            ))?;
            Ok(stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?)
        })
    }
}
