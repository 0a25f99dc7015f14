//! 混合检索
//!
//! 以流水线方式执行：向量检索在工作池中完成后，按命中顺序取出实体 id，
//! 再把图谱扩展派发到工作池。向量检索失败时不会发起图谱调用。

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::GraphFailurePolicy;
use crate::error::{Result, Stage};
use crate::graph::GraphExpander;
use crate::models::HybridEvidence;
use crate::services::retrieval::VectorRetriever;
use crate::services::worker_pool::WorkerPool;

pub struct HybridRetriever {
    vector: Arc<VectorRetriever>,
    graph: Arc<GraphExpander>,
    pool: WorkerPool,
    on_graph_unavailable: GraphFailurePolicy,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<VectorRetriever>,
        graph: Arc<GraphExpander>,
        pool: WorkerPool,
        on_graph_unavailable: GraphFailurePolicy,
    ) -> Self {
        Self {
            vector,
            graph,
            pool,
            on_graph_unavailable,
        }
    }

    #[instrument(skip(self, query))]
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<HybridEvidence> {
        let top_k = top_k.unwrap_or_else(|| self.vector.default_top_k());

        let vector = self.vector.clone();
        let text = query.to_string();
        let matches = self
            .pool
            .run(Stage::VectorQuery, async move { vector.query(&text, top_k).await })
            .await?;

        let ids: Vec<String> = matches.iter().map(|m| m.id.clone()).collect();
        let graph = self.graph.clone();
        let expansion = self
            .pool
            .run(Stage::GraphExpansion, async move { graph.expand(&ids).await })
            .await;

        match expansion {
            Ok(expansion) => {
                info!(
                    "Hybrid retrieval: {} matches, {} facts",
                    matches.len(),
                    expansion.facts.len()
                );
                let mut evidence = HybridEvidence::new(matches, expansion.facts);
                evidence.skipped = expansion.skipped;
                Ok(evidence)
            }
            Err(e)
                if e.stage() == Stage::GraphExpansion
                    && self.on_graph_unavailable == GraphFailurePolicy::VectorOnly =>
            {
                warn!("Graph unavailable, answering from vector evidence only: {}", e);
                let mut evidence = HybridEvidence::new(matches, Vec::new());
                evidence.graph_degraded = true;
                Ok(evidence)
            }
            Err(e) => Err(e),
        }
    }
}
