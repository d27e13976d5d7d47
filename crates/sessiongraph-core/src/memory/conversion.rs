//! Conversion from an analyzer's output into a `Node`.
//!
//! The analyzer and the job scheduler are external collaborators (see
//! SPEC_FULL §6.3): this module is the one seam where their plain-data
//! contracts become a `Node`. Unknown-field rejection (`deny_unknown_fields`)
//! guards this boundary the same way the teacher's `IngestInput` guards its
//! own ingestion boundary, since a malformed/renamed upstream field should
//! fail loudly here rather than silently vanish.

use super::node::{
    DaemonDecisionRecord, DaemonMeta, ErrorSeen, KeyDecision, Lesson, ModelQuirk, ModelUsage,
    Node, NodeMetadata, NodeSource, NodeType, Outcome, Segment, ToolUseError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification fields contributed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Classification {
    #[serde(rename = "type")]
    pub node_type: String,
    pub project: String,
    #[serde(default)]
    pub is_new_project: bool,
    #[serde(default)]
    pub had_clear_goal: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
}

/// Content fields contributed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Content {
    pub summary: String,
    pub outcome: String,
    #[serde(default)]
    pub key_decisions: Vec<KeyDecision>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub errors_seen: Vec<ErrorSeen>,
}

/// Observation fields contributed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Observations {
    #[serde(default)]
    pub models_used: Vec<ModelUsage>,
    #[serde(default)]
    pub prompting_wins: Vec<String>,
    #[serde(default)]
    pub prompting_failures: Vec<String>,
    #[serde(default)]
    pub model_quirks: Vec<ModelQuirk>,
    #[serde(default)]
    pub tool_use_errors: Vec<ToolUseError>,
}

/// Semantic fields contributed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Semantic {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub related_projects: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// Everything an analyzer produces for one segment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentOutput {
    pub classification: Option<Classification>,
    pub content: Option<Content>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub observations: Observations,
    #[serde(default)]
    pub semantic: Semantic,
    #[serde(default)]
    pub daemon_meta: DaemonMeta,
}

/// The scheduling/bookkeeping facts about the job that produced an `AgentOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobContext {
    pub session_file: String,
    pub segment_start: String,
    pub segment_end: String,
    pub entry_count: u32,
    pub queued_at: DateTime<Utc>,
    pub computer: String,
    pub session_id: String,
    #[serde(default)]
    pub parent_session: Option<String>,
    pub analysis_duration_ms: u64,
    pub analyzer_version: String,
    #[serde(default)]
    pub existing_node: Option<Node>,
    #[serde(default)]
    pub signals: Option<String>,
}

/// Build a `Node` from an analyzer's output and the job context that
/// produced it (SPEC_FULL §4.6 "Conversion from AgentOutput + JobContext").
///
/// If `ctx.existing_node` is set, the result reuses its id and bumps
/// `version`, chaining `previousVersions` — this is the *reanalysis* path
/// (see DESIGN.md Open Question 1); it is distinct from, and always bumps
/// version unlike, `Storage::upsert_node`.
pub fn convert(output: AgentOutput, ctx: JobContext) -> Node {
    let (id, version, previous_versions) = match &ctx.existing_node {
        Some(existing) => {
            let mut previous = existing.previous_versions.clone();
            previous.push(format!("{}-v{}", existing.id, existing.version));
            (existing.id.clone(), existing.version + 1, previous)
        }
        None => (
            crate::id::node_id(&ctx.session_file, &ctx.segment_start, &ctx.segment_end),
            1,
            vec![],
        ),
    };

    let classification = output.classification.unwrap_or(Classification {
        node_type: "other".to_string(),
        project: String::new(),
        is_new_project: false,
        had_clear_goal: false,
        language: None,
        frameworks: vec![],
    });
    let content = output.content.unwrap_or(Content {
        summary: String::new(),
        outcome: "abandoned".to_string(),
        key_decisions: vec![],
        files_touched: vec![],
        tools_used: vec![],
        errors_seen: vec![],
    });

    let tokens_used: u64 = output
        .observations
        .models_used
        .iter()
        .map(|m| m.tokens_input + m.tokens_output)
        .sum();
    let cost: f64 = output.observations.models_used.iter().map(|m| m.cost).sum();
    let duration_minutes = ((ctx.analysis_duration_ms as f64) / 60_000.0).round() as u32;

    let lessons = output
        .lessons
        .into_iter()
        .map(|mut l| {
            if l.id.is_empty() {
                l.id = crate::id::lesson_id();
            }
            l
        })
        .collect();
    let model_quirks = output
        .observations
        .model_quirks
        .into_iter()
        .map(|mut q| {
            if q.id.is_empty() {
                q.id = crate::id::quirk_id();
            }
            q
        })
        .collect();
    let tool_use_errors = output
        .observations
        .tool_use_errors
        .into_iter()
        .map(|mut e| {
            if e.id.is_empty() {
                e.id = crate::id::tool_error_id();
            }
            e
        })
        .collect();
    let mut daemon_meta = output.daemon_meta;
    for decision in &mut daemon_meta.decisions {
        if decision.id.is_empty() {
            decision.id = crate::id::decision_id();
        }
    }

    Node {
        id,
        version,
        previous_versions,
        source: NodeSource {
            session_file: ctx.session_file,
            segment: Segment {
                start_entry_id: ctx.segment_start,
                end_entry_id: ctx.segment_end,
                entry_count: ctx.entry_count,
            },
            computer: ctx.computer,
            session_id: ctx.session_id,
            parent_session: ctx.parent_session,
        },
        node_type: NodeType::parse_name(&classification.node_type),
        project: classification.project,
        is_new_project: classification.is_new_project,
        had_clear_goal: classification.had_clear_goal,
        language: classification.language,
        frameworks: classification.frameworks,
        summary: content.summary,
        outcome: Outcome::parse_name(&content.outcome),
        key_decisions: content.key_decisions,
        files_touched: content.files_touched,
        tools_used: content.tools_used,
        errors_seen: content.errors_seen,
        lessons,
        models_used: output.observations.models_used,
        prompting_wins: output.observations.prompting_wins,
        prompting_failures: output.observations.prompting_failures,
        model_quirks,
        tool_use_errors,
        metadata: NodeMetadata {
            tokens_used,
            cost,
            duration_minutes,
            timestamp: ctx.queued_at,
            analyzed_at: Utc::now(),
            analyzer_version: ctx.analyzer_version,
        },
        tags: output.semantic.tags,
        topics: output.semantic.topics,
        related_projects: output.semantic.related_projects,
        concepts: output.semantic.concepts,
        daemon_meta,
        signals: ctx.signals,
        relevance_score: 1.0,
        last_accessed: None,
        archived: false,
        importance: 0.0,
        extra: serde_json::Map::new(),
    }
}
