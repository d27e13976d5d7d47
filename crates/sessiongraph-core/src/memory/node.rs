//! Node type and its enum-narrowing classification fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session/segment classification. Unknown values on ingestion narrow to
/// `Other` rather than failing the whole ingest (see `parse_name`).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Coding,
    Sysadmin,
    Research,
    Planning,
    Debugging,
    Qa,
    Brainstorm,
    Handoff,
    Refactor,
    Documentation,
    Configuration,
    #[default]
    Other,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Coding => "coding",
            NodeType::Sysadmin => "sysadmin",
            NodeType::Research => "research",
            NodeType::Planning => "planning",
            NodeType::Debugging => "debugging",
            NodeType::Qa => "qa",
            NodeType::Brainstorm => "brainstorm",
            NodeType::Handoff => "handoff",
            NodeType::Refactor => "refactor",
            NodeType::Documentation => "documentation",
            NodeType::Configuration => "configuration",
            NodeType::Other => "other",
        }
    }

    /// Parse, narrowing anything unrecognized to `Other` instead of erroring.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "coding" => NodeType::Coding,
            "sysadmin" => NodeType::Sysadmin,
            "research" => NodeType::Research,
            "planning" => NodeType::Planning,
            "debugging" => NodeType::Debugging,
            "qa" => NodeType::Qa,
            "brainstorm" => NodeType::Brainstorm,
            "handoff" => NodeType::Handoff,
            "refactor" => NodeType::Refactor,
            "documentation" => NodeType::Documentation,
            "configuration" => NodeType::Configuration,
            _ => NodeType::Other,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session outcome. Unknown values narrow to `Abandoned` (the most
/// conservative reading: if we can't classify it, don't call it a success).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
    #[default]
    Abandoned,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
            Outcome::Abandoned => "abandoned",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Outcome::Success,
            "partial" => Outcome::Partial,
            "failed" => Outcome::Failed,
            _ => Outcome::Abandoned,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lesson level. No default narrowing target is specified by the data
/// model (every level is equally valid); unrecognized input narrows to
/// `Task`, the most common level in practice.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LessonLevel {
    Project,
    #[default]
    Task,
    User,
    Model,
    Tool,
    Skill,
    Subagent,
}

impl LessonLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonLevel::Project => "project",
            LessonLevel::Task => "task",
            LessonLevel::User => "user",
            LessonLevel::Model => "model",
            LessonLevel::Tool => "tool",
            LessonLevel::Skill => "skill",
            LessonLevel::Subagent => "subagent",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "project" => LessonLevel::Project,
            "user" => LessonLevel::User,
            "model" => LessonLevel::Model,
            "tool" => LessonLevel::Tool,
            "skill" => LessonLevel::Skill,
            "subagent" => LessonLevel::Subagent,
            _ => LessonLevel::Task,
        }
    }

    pub const ALL: [LessonLevel; 7] = [
        LessonLevel::Project,
        LessonLevel::Task,
        LessonLevel::User,
        LessonLevel::Model,
        LessonLevel::Tool,
        LessonLevel::Skill,
        LessonLevel::Subagent,
    ];
}

impl fmt::Display for LessonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence narrows unknown values to `Low` — the conservative default
/// whenever a classifier is unsure of its own certainty.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "medium" => Confidence::Medium,
            "high" => Confidence::High,
            _ => Confidence::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model-quirk observation frequency, ranked so filters can express
/// "at least this often" (`>= requested rank`).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Once,
    Sometimes,
    Often,
    Always,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Sometimes => "sometimes",
            Frequency::Often => "often",
            Frequency::Always => "always",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sometimes" => Frequency::Sometimes,
            "often" => Frequency::Often,
            "always" => Frequency::Always,
            _ => Frequency::Once,
        }
    }

    /// All frequencies whose rank is >= `self`, used by the quirk filter's
    /// "minimum frequency" semantics.
    pub fn at_least(self) -> Vec<Frequency> {
        [
            Frequency::Once,
            Frequency::Sometimes,
            Frequency::Often,
            Frequency::Always,
        ]
        .into_iter()
        .filter(|f| *f >= self)
        .collect()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model-quirk severity, narrowing unknown values to `Low`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "medium" => Severity::Medium,
            "high" => Severity::High,
            _ => Severity::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Edge type. Unknown incoming boundary types fall back to `Continuation`
/// (see `storage::sqlite::link_node_to_predecessors`).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    #[default]
    Continuation,
    Resume,
    Fork,
    Branch,
    TreeJump,
    Compaction,
    Semantic,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Continuation => "continuation",
            EdgeType::Resume => "resume",
            EdgeType::Fork => "fork",
            EdgeType::Branch => "branch",
            EdgeType::TreeJump => "tree_jump",
            EdgeType::Compaction => "compaction",
            EdgeType::Semantic => "semantic",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "resume" => EdgeType::Resume,
            "fork" => EdgeType::Fork,
            "branch" => EdgeType::Branch,
            "tree_jump" => EdgeType::TreeJump,
            "compaction" => EdgeType::Compaction,
            "semantic" => EdgeType::Semantic,
            _ => EdgeType::Continuation,
        }
    }

    /// Whether this type is one of the structural boundary types the
    /// auto-linker is allowed to assign on its own (excludes `Semantic`,
    /// which only the embedding-similarity pipeline creates).
    pub fn is_boundary_type(&self) -> bool {
        !matches!(self, EdgeType::Semantic)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who created an edge.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCreator {
    Boundary,
    #[default]
    Daemon,
    User,
}

impl EdgeCreator {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeCreator::Boundary => "boundary",
            EdgeCreator::Daemon => "daemon",
            EdgeCreator::User => "user",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "boundary" => EdgeCreator::Boundary,
            "user" => EdgeCreator::User,
            _ => EdgeCreator::Daemon,
        }
    }
}

impl fmt::Display for EdgeCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A session segment's file range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_entry_id: String,
    pub end_entry_id: String,
    pub entry_count: u32,
}

/// `source` sub-record of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSource {
    pub session_file: String,
    pub segment: Segment,
    pub computer: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session: Option<String>,
}

/// A single key decision recorded during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDecision {
    pub what: String,
    pub why: String,
    #[serde(default)]
    pub alternatives_considered: Vec<String>,
}

/// An error encountered and (maybe) resolved during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSeen {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub resolved: bool,
}

/// A single lesson, scoped to one `LessonLevel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default)]
    pub id: String,
    pub level: LessonLevel,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionable: Option<bool>,
}

/// Token/cost accounting for one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,
    pub cost: f64,
}

/// An observed model quirk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelQuirk {
    #[serde(default)]
    pub id: String,
    pub model: String,
    pub observation: String,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workaround: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// A tool-use failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseError {
    #[serde(default)]
    pub id: String,
    pub tool: String,
    pub error_type: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub was_retried: bool,
}

/// A decision made by the ingestion daemon about how to classify/route a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonDecisionRecord {
    #[serde(default)]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub reasoning: String,
    #[serde(default)]
    pub needs_review: bool,
}

/// Derived accounting + timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub tokens_used: u64,
    pub cost: f64,
    pub duration_minutes: u32,
    pub timestamp: DateTime<Utc>,
    pub analyzed_at: DateTime<Utc>,
    pub analyzer_version: String,
}

/// Daemon-owned bookkeeping about how this node was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DaemonMeta {
    #[serde(default)]
    pub decisions: Vec<DaemonDecisionRecord>,
    #[serde(default)]
    pub rlm_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codemap_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_token_count: Option<u32>,
}

/// The unit of ingestion: one analyzed segment of one recorded coding
/// session, plus its classification, lessons, and observations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub previous_versions: Vec<String>,

    pub source: NodeSource,

    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub project: String,
    #[serde(default)]
    pub is_new_project: bool,
    #[serde(default)]
    pub had_clear_goal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,

    pub summary: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub key_decisions: Vec<KeyDecision>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub errors_seen: Vec<ErrorSeen>,

    #[serde(default)]
    pub lessons: Vec<Lesson>,

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

    pub metadata: NodeMetadata,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub related_projects: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,

    #[serde(default)]
    pub daemon_meta: DaemonMeta,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<String>,
    #[serde(default = "default_relevance")]
    pub relevance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub importance: f64,

    /// Fields present in the on-disk record that this version of the crate
    /// doesn't know about yet; preserved verbatim on rewrite (§6.2 forward
    /// compatibility).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_relevance() -> f64 {
    1.0
}

impl Node {
    /// Tags visible to filters: node-level tags unioned with every lesson's
    /// own tags, de-duplicated (tag AND-semantics operates over this set).
    pub fn effective_tags(&self) -> Vec<String> {
        let mut set: std::collections::BTreeSet<String> = self.tags.iter().cloned().collect();
        for lesson in &self.lessons {
            set.extend(lesson.tags.iter().cloned());
        }
        set.into_iter().collect()
    }

    /// Combined decision text for FTS indexing: `"{what} {why}"` per decision.
    pub fn decisions_text(&self) -> String {
        self.key_decisions
            .iter()
            .map(|d| format!("{} {}", d.what, d.why))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Combined lesson text for FTS indexing: `"{summary} {details}"` per lesson.
    pub fn lessons_text(&self) -> String {
        self.lessons
            .iter()
            .map(|l| format!("{} {}", l.summary, l.details))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn sample_node(id: &str, version: u32) -> Node {
        let now = Utc::now();
        Node {
            id: id.to_string(),
            version,
            previous_versions: vec![],
            source: NodeSource {
                session_file: "/sessions/sample.jsonl".to_string(),
                segment: Segment {
                    start_entry_id: "e1".to_string(),
                    end_entry_id: "e10".to_string(),
                    entry_count: 10,
                },
                computer: "test-host".to_string(),
                session_id: "sess-1".to_string(),
                parent_session: None,
            },
            node_type: NodeType::Coding,
            project: "sample-project".to_string(),
            is_new_project: false,
            had_clear_goal: true,
            language: Some("rust".to_string()),
            frameworks: vec![],
            summary: "Implemented the sample feature".to_string(),
            outcome: Outcome::Success,
            key_decisions: vec![],
            files_touched: vec![],
            tools_used: vec![],
            errors_seen: vec![],
            lessons: vec![],
            models_used: vec![],
            prompting_wins: vec![],
            prompting_failures: vec![],
            model_quirks: vec![],
            tool_use_errors: vec![],
            metadata: NodeMetadata {
                tokens_used: 100,
                cost: 0.01,
                duration_minutes: 5,
                timestamp: now,
                analyzed_at: now,
                analyzer_version: "test".to_string(),
            },
            tags: vec![],
            topics: vec![],
            related_projects: vec![],
            concepts: vec![],
            daemon_meta: DaemonMeta::default(),
            signals: None,
            relevance_score: 1.0,
            last_accessed: None,
            archived: false,
            importance: 0.0,
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_narrows_unknown_to_other() {
        assert_eq!(NodeType::parse_name("coding"), NodeType::Coding);
        assert_eq!(NodeType::parse_name("bogus"), NodeType::Other);
    }

    #[test]
    fn outcome_narrows_unknown_to_abandoned() {
        assert_eq!(Outcome::parse_name("success"), Outcome::Success);
        assert_eq!(Outcome::parse_name("nonsense"), Outcome::Abandoned);
    }

    #[test]
    fn frequency_at_least_includes_higher_ranks() {
        let at_least_often = Frequency::Often.at_least();
        assert!(at_least_often.contains(&Frequency::Often));
        assert!(at_least_often.contains(&Frequency::Always));
        assert!(!at_least_often.contains(&Frequency::Once));
    }

    #[test]
    fn effective_tags_union_node_and_lesson_tags() {
        let mut node = test_support::sample_node("a1b2c3d4e5f60718", 1);
        node.tags = vec!["a".into()];
        node.lessons.push(Lesson {
            id: "les_1".into(),
            level: LessonLevel::Task,
            summary: "s".into(),
            details: "d".into(),
            confidence: Confidence::Low,
            tags: vec!["b".into(), "a".into()],
            actionable: None,
        });
        let tags = node.effective_tags();
        assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn node_round_trips_through_json_preserving_unknown_fields() {
        let mut node = test_support::sample_node("a1b2c3d4e5f60718", 1);
        node.extra
            .insert("futureField".to_string(), serde_json::json!("kept"));
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra.get("futureField").unwrap(), "kept");
        assert_eq!(back, node);
    }
}
