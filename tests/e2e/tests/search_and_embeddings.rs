//! Full-text field scoping and embedding-backfill staleness detection.

use async_trait::async_trait;
use sessiongraph_core::{EmbeddingProvider, NodeFilters, StorageError};
use sessiongraph_e2e_tests::harness::TestGraphManager;
use sessiongraph_e2e_tests::mocks::NodeBuilder;

#[test]
fn search_can_be_scoped_to_a_single_fts_field() {
    let mut db = TestGraphManager::new_temp();

    let n1 = NodeBuilder::new("/s1.jsonl", "e1", "e2").summary("uniqueFieldTest").build();
    let n2 = NodeBuilder::new("/s2.jsonl", "e1", "e2")
        .decision("uniqueFieldTest", "x")
        .build();
    db.storage.create_node(&n1).unwrap();
    db.storage.create_node(&n2).unwrap();

    let summary_only = db
        .storage
        .search("uniqueFieldTest", &["summary"], &NodeFilters::default(), None, 0)
        .unwrap();
    assert_eq!(summary_only.results.len(), 1);
    assert_eq!(summary_only.results[0].node.id, n1.id);

    let decisions_only = db
        .storage
        .search("uniqueFieldTest", &["decisions"], &NodeFilters::default(), None, 0)
        .unwrap();
    assert_eq!(decisions_only.results.len(), 1);
    assert_eq!(decisions_only.results[0].node.id, n2.id);

    let unscoped = db
        .storage
        .search("uniqueFieldTest", &[], &NodeFilters::default(), None, 0)
        .unwrap();
    assert_eq!(unscoped.results.len(), 2);
}

/// Always reports `"mock-v2"` so nodes embedded under a different model name
/// look stale to `find_nodes_needing_embedding`.
struct MockProvider;

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock-v2"
    }

    fn dimensions(&self) -> usize {
        8
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, StorageError> {
        Ok(batch.iter().map(|_| vec![0.1; 8]).collect())
    }
}

#[tokio::test]
async fn backfill_skips_up_to_date_embeddings_and_targets_stale_ones() {
    let mut db = TestGraphManager::new_temp();
    let provider = MockProvider;

    let mut up_to_date_ids = Vec::new();
    for i in 0..5 {
        let node = NodeBuilder::new("/fresh.jsonl", &format!("e{i}"), &format!("e{}", i + 1))
            .summary(format!("fresh node {i}"))
            .build();
        db.storage.create_node(&node).unwrap();
        let text = sessiongraph_core::build_embedding_text(&node);
        db.storage
            .store_embedding_with_vec(&node.id, &vec![0.1; 8], provider.model_name(), &text)
            .unwrap();
        up_to_date_ids.push(node.id);
    }

    let stale = NodeBuilder::new("/stale.jsonl", "e1", "e2").summary("never embedded").build();
    db.storage.create_node(&stale).unwrap();

    let needing_embedding = db.storage.find_nodes_needing_embedding(&provider, false).unwrap();
    let needing_ids: Vec<_> = needing_embedding.iter().map(|n| n.id.clone()).collect();

    assert!(needing_ids.contains(&stale.id), "a node with no embedding at all must be selected");
    for id in &up_to_date_ids {
        assert!(!needing_ids.contains(id), "a node already embedded with the current model/format must be skipped");
    }
}
