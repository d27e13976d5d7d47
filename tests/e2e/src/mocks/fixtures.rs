//! Test data factory
//!
//! Builds realistic `Node` fixtures without pulling in an analyzer or a job
//! scheduler, for tests that only care about the storage/query/graph layer.

use chrono::Utc;
use sessiongraph_core::{
    KeyDecision, Lesson, LessonLevel, ModelQuirk, Node, NodeMetadata, NodeSource, NodeType,
    Outcome, Segment, ToolUseError,
};

/// Builder for one `Node`, with sessiongraph-appropriate defaults so tests
/// only set the fields the scenario actually cares about.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(session_file: &str, segment_start: &str, segment_end: &str) -> Self {
        let now = Utc::now();
        let id = sessiongraph_core::node_id(session_file, segment_start, segment_end);
        let node = Node {
            id,
            version: 1,
            previous_versions: vec![],
            source: NodeSource {
                session_file: session_file.to_string(),
                segment: Segment {
                    start_entry_id: segment_start.to_string(),
                    end_entry_id: segment_end.to_string(),
                    entry_count: 1,
                },
                computer: "test-host".to_string(),
                session_id: session_file.to_string(),
                parent_session: None,
            },
            node_type: NodeType::Coding,
            project: "fixture-project".to_string(),
            is_new_project: false,
            had_clear_goal: true,
            language: Some("rust".to_string()),
            frameworks: vec![],
            summary: "fixture node".to_string(),
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
                tokens_used: 0,
                cost: 0.0,
                duration_minutes: 1,
                timestamp: now,
                analyzed_at: now,
                analyzer_version: "fixture".to_string(),
            },
            tags: vec![],
            topics: vec![],
            related_projects: vec![],
            concepts: vec![],
            daemon_meta: Default::default(),
            signals: None,
            relevance_score: 1.0,
            last_accessed: None,
            archived: false,
            importance: 0.0,
            extra: serde_json::Map::new(),
        };
        Self { node }
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.node.project = project.into();
        self
    }

    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.node.node_type = node_type;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.node.summary = summary.into();
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.node.outcome = outcome;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.node.tags.push(tag.into());
        self
    }

    pub fn timestamp(mut self, timestamp: chrono::DateTime<Utc>) -> Self {
        self.node.metadata.timestamp = timestamp;
        self
    }

    pub fn parent_session(mut self, parent_session: impl Into<String>) -> Self {
        self.node.source.parent_session = Some(parent_session.into());
        self
    }

    pub fn decision(mut self, what: impl Into<String>, why: impl Into<String>) -> Self {
        self.node.key_decisions.push(KeyDecision {
            what: what.into(),
            why: why.into(),
            alternatives_considered: vec![],
        });
        self
    }

    pub fn lesson(mut self, level: LessonLevel, summary: impl Into<String>) -> Self {
        self.node.lessons.push(Lesson {
            id: sessiongraph_core::lesson_id(),
            level,
            summary: summary.into(),
            details: String::new(),
            confidence: sessiongraph_core::Confidence::Medium,
            actionable: None,
            tags: vec![],
        });
        self
    }

    pub fn quirk(mut self, model: impl Into<String>, observation: impl Into<String>) -> Self {
        self.node.model_quirks.push(ModelQuirk {
            id: sessiongraph_core::quirk_id(),
            model: model.into(),
            observation: observation.into(),
            workaround: None,
            frequency: sessiongraph_core::Frequency::Often,
            severity: sessiongraph_core::Severity::Medium,
        });
        self
    }

    pub fn tool_error(mut self, tool: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.node.tool_use_errors.push(ToolUseError {
            id: sessiongraph_core::tool_error_id(),
            tool: tool.into(),
            error_type: error_type.into(),
            context: String::new(),
            model: None,
            was_retried: false,
        });
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

/// Builds `count` independent nodes across distinct sessions, for bulk
/// listing/pagination/aggregation tests.
pub fn batch(project: &str, count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| {
            let session_file = format!("/sessions/batch-{i}.jsonl");
            NodeBuilder::new(&session_file, "e0", "e1")
                .project(project)
                .summary(format!("batch node {i}"))
                .tag(format!("batch-{}", i % 3))
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults_and_overrides() {
        let node = NodeBuilder::new("/s.jsonl", "e1", "e10")
            .project("demo")
            .summary("did a thing")
            .tag("rust")
            .build();
        assert_eq!(node.project, "demo");
        assert_eq!(node.summary, "did a thing");
        assert_eq!(node.tags, vec!["rust".to_string()]);
        assert_eq!(node.version, 1);
    }

    #[test]
    fn batch_produces_distinct_session_files() {
        let nodes = batch("demo", 5);
        assert_eq!(nodes.len(), 5);
        let unique: std::collections::HashSet<_> =
            nodes.iter().map(|n| n.source.session_file.clone()).collect();
        assert_eq!(unique.len(), 5);
    }
}
