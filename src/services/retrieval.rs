//! 向量检索服务

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::index::{EmbeddingCache, VectorIndex};
use crate::models::VectorMatch;
use crate::observability::metrics;

pub const DEFAULT_TOP_K: usize = 5;

pub struct VectorRetriever {
    cache: Arc<EmbeddingCache>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
}

impl VectorRetriever {
    pub fn new(cache: Arc<EmbeddingCache>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            cache,
            index,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.max(1);
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// 相似度检索，结果顺序与索引返回一致
    ///
    /// 嵌入失败会原样向上传播，不会退化为空结果。
    #[instrument(skip(self, text))]
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        let vector = self.cache.embed(text).await?;

        metrics().vector_queries.inc();
        let matches = self
            .index
            .query(&vector, top_k)
            .await
            .map_err(|e| match e {
                AppError::VectorQueryFailed(_) | AppError::Timeout { .. } => e,
                other => AppError::VectorQueryFailed(other.to_string()),
            })?;

        debug!("Vector query returned {} matches", matches.len());
        Ok(matches)
    }
}
