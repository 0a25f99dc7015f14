//! 图谱邻居扩展
//!
//! 对每个输入实体执行一次一跳查询，每个实体最多保留 `neighbors_per_node` 条事实。
//! 连接不可用时整个调用失败；单个实体查询失败只记录为跳过，不影响其余实体。

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::store::{GraphStore, GraphStoreError, NeighborRecord};
use crate::config::GraphConfig;
use crate::error::{AppError, Result};
use crate::models::{GraphFact, SkippedId};
use crate::observability::metrics;

/// 一次扩展的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub facts: Vec<GraphFact>,
    pub skipped: Vec<SkippedId>,
}

pub struct GraphExpander {
    store: Arc<dyn GraphStore>,
    neighbors_per_node: usize,
    description_max_chars: usize,
}

impl GraphExpander {
    pub fn new(store: Arc<dyn GraphStore>, config: &GraphConfig) -> Self {
        Self {
            store,
            neighbors_per_node: config.neighbors_per_node,
            description_max_chars: config.description_max_chars,
        }
    }

    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn expand(&self, ids: &[String]) -> Result<Expansion> {
        let mut expansion = Expansion::default();
        if ids.is_empty() {
            return Ok(expansion);
        }

        self.store.ping().await.map_err(|e| match e {
            GraphStoreError::Unavailable(msg) | GraphStoreError::Query(msg) => {
                AppError::GraphUnavailable(msg)
            }
        })?;

        for id in ids {
            match self.store.neighbors(id, self.neighbors_per_node).await {
                Ok(records) => {
                    expansion.facts.extend(
                        records
                            .into_iter()
                            .take(self.neighbors_per_node)
                            .map(|record| self.to_fact(id, record)),
                    );
                }
                Err(GraphStoreError::Unavailable(msg)) => {
                    return Err(AppError::GraphUnavailable(msg));
                }
                Err(GraphStoreError::Query(reason)) => {
                    warn!("Graph expansion skipped id {}: {}", id, reason);
                    metrics().graph_skipped_ids.inc();
                    expansion.skipped.push(SkippedId {
                        id: id.clone(),
                        reason,
                    });
                }
            }
        }

        metrics().graph_facts.inc_by(expansion.facts.len() as u64);
        debug!(
            "Graph expansion produced {} facts ({} skipped)",
            expansion.facts.len(),
            expansion.skipped.len()
        );
        Ok(expansion)
    }

    fn to_fact(&self, source_id: &str, record: NeighborRecord) -> GraphFact {
        let description = record.description.unwrap_or_default();
        GraphFact {
            source_id: source_id.to_string(),
            relation: record.relation,
            target_name: record.name.unwrap_or_else(|| record.id.clone()),
            target_id: record.id,
            target_type: record.kind,
            target_description: truncate_chars(&description, self.description_max_chars),
            target_labels: record.labels,
        }
    }
}

/// 按字符截断
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::graph::store::MockGraphStore;
    use mockall::predicate::eq;
    use rstest::rstest;

    fn expander(store: MockGraphStore) -> GraphExpander {
        GraphExpander::new(Arc::new(store), &AppConfig::development().graph)
    }

    fn neighbor(id: &str, description: Option<String>) -> NeighborRecord {
        NeighborRecord {
            relation: "Near".into(),
            id: id.into(),
            name: Some(id.to_uppercase()),
            kind: Some("Attraction".into()),
            description,
            labels: vec!["Entity".into()],
        }
    }

    #[rstest]
    #[case(Some("x".repeat(500)), 400)]
    #[case(Some("y".repeat(400)), 400)]
    #[case(Some("short".to_string()), 5)]
    #[case(None, 0)]
    #[tokio::test]
    async fn test_description_truncation(
        #[case] description: Option<String>,
        #[case] expected_len: usize,
    ) {
        let mut store = MockGraphStore::new();
        store.expect_ping().returning(|| Ok(()));
        store
            .expect_neighbors()
            .returning(move |_, _| Ok(vec![neighbor("hanoi", description.clone())]));

        let expansion = expander(store)
            .expand(&["hoan_kiem_lake".to_string()])
            .await
            .unwrap();
        assert_eq!(expansion.facts.len(), 1);
        assert_eq!(
            expansion.facts[0].target_description.chars().count(),
            expected_len
        );
    }

    #[tokio::test]
    async fn test_per_id_cap_is_ten() {
        let mut store = MockGraphStore::new();
        store.expect_ping().returning(|| Ok(()));
        store
            .expect_neighbors()
            .with(eq("hanoi_old_quarter"), eq(10))
            .times(1)
            .returning(|_, _| {
                Ok((0..15)
                    .map(|i| neighbor(&format!("n{}", i), None))
                    .collect())
            });
        store
            .expect_neighbors()
            .with(eq("hoan_kiem_lake"), eq(10))
            .times(1)
            .returning(|_, _| {
                Ok((0..15)
                    .map(|i| neighbor(&format!("m{}", i), None))
                    .collect())
            });

        let ids = vec!["hanoi_old_quarter".to_string(), "hoan_kiem_lake".to_string()];
        let expansion = expander(store).expand(&ids).await.unwrap();

        assert_eq!(expansion.facts.len(), 20);
        assert!(
            expansion.facts[..10]
                .iter()
                .all(|f| f.source_id == "hanoi_old_quarter")
        );
        assert!(
            expansion.facts[10..]
                .iter()
                .all(|f| f.source_id == "hoan_kiem_lake")
        );
    }

    #[tokio::test]
    async fn test_bad_id_is_skipped() {
        let mut store = MockGraphStore::new();
        store.expect_ping().returning(|| Ok(()));
        store
            .expect_neighbors()
            .with(eq("bad id"), eq(10))
            .returning(|_, _| Err(GraphStoreError::Query("syntax error".into())));
        store
            .expect_neighbors()
            .with(eq("hue_citadel"), eq(10))
            .returning(|_, _| Ok(vec![neighbor("hue", Some("Imperial city".into()))]));

        let ids = vec!["bad id".to_string(), "hue_citadel".to_string()];
        let expansion = expander(store).expand(&ids).await.unwrap();

        assert_eq!(expansion.facts.len(), 1);
        assert_eq!(expansion.facts[0].source_id, "hue_citadel");
        assert_eq!(expansion.facts[0].target_name, "HUE");
        assert_eq!(expansion.skipped.len(), 1);
        assert_eq!(expansion.skipped[0].id, "bad id");
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_whole_call() {
        let mut store = MockGraphStore::new();
        store
            .expect_ping()
            .returning(|| Err(GraphStoreError::Unavailable("connection refused".into())));
        store.expect_neighbors().never();

        let err = expander(store)
            .expand(&["hanoi".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GraphUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connection_lost_after_ping_aborts() {
        let mut store = MockGraphStore::new();
        store.expect_ping().returning(|| Ok(()));
        store
            .expect_neighbors()
            .with(eq("hanoi_old_quarter"), eq(10))
            .times(1)
            .returning(|_, _| Ok(vec![neighbor("hanoi", None)]));
        store
            .expect_neighbors()
            .with(eq("hoan_kiem_lake"), eq(10))
            .times(1)
            .returning(|_, _| Err(GraphStoreError::Unavailable("connection reset".into())));
        store
            .expect_neighbors()
            .with(eq("hue_citadel"), eq(10))
            .never();

        let ids = vec![
            "hanoi_old_quarter".to_string(),
            "hoan_kiem_lake".to_string(),
            "hue_citadel".to_string(),
        ];
        let err = expander(store).expand(&ids).await.unwrap_err();
        assert!(matches!(err, AppError::GraphUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_input_skips_store() {
        let mut store = MockGraphStore::new();
        store.expect_ping().never();
        let expansion = expander(store).expand(&[]).await.unwrap();
        assert_eq!(expansion, Expansion::default());
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_chars("Hà Nội", 2), "Hà");
        assert_eq!(truncate_chars("Huế", 10), "Huế");
    }
}
