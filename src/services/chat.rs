//! 对话会话
//!
//! 处理一行用户输入：控制命令，或者混合检索、生成回答并写入对话记忆。

use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::Result;
use crate::graph::{GraphExpander, create_graph_store};
use crate::index::{EmbeddingCache, create_embedding_provider, create_vector_index};
use crate::llm::create_chat_model;
use crate::observability::metrics;
use crate::services::conversation::ConversationMemory;
use crate::services::hybrid::HybridRetriever;
use crate::services::orchestrator::{Answer, AnswerOrchestrator};
use crate::services::retrieval::VectorRetriever;
use crate::services::worker_pool::WorkerPool;

/// 一行输入的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answered(Answer),
    Cleared,
    Exit,
    Empty,
}

pub struct ChatSession {
    retriever: Arc<HybridRetriever>,
    orchestrator: AnswerOrchestrator,
    memory: Arc<ConversationMemory>,
    memory_access_enabled: bool,
    top_k: Option<usize>,
}

impl ChatSession {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        orchestrator: AnswerOrchestrator,
        memory: Arc<ConversationMemory>,
        memory_access_enabled: bool,
    ) -> Self {
        Self {
            retriever,
            orchestrator,
            memory,
            memory_access_enabled,
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// 按配置连接所有外部服务并组装会话
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = WorkerPool::from_config(&config.runtime);

        let provider = create_embedding_provider(&config.embedding)?;
        let index = create_vector_index(&config.vector).await?;
        let cache = Arc::new(
            EmbeddingCache::from_config(provider, &config.embedding)
                .with_dimension(index.dimension()),
        );
        let vector = Arc::new(VectorRetriever::new(cache, index).with_top_k(config.vector.top_k));

        let store = create_graph_store(&config.graph).await?;
        let graph = Arc::new(GraphExpander::new(store, &config.graph));

        let retriever = Arc::new(HybridRetriever::new(
            vector,
            graph,
            pool.clone(),
            config.runtime.on_graph_unavailable,
        ));

        let memory = Arc::new(ConversationMemory::from_config(&config.memory));
        let model = create_chat_model(&config.llm)?;
        let orchestrator = AnswerOrchestrator::new(model, memory.clone(), pool);

        info!(
            "Chat session ready (pool {}, history window {} turns)",
            config.runtime.worker_pool_size, config.memory.max_history_turns
        );
        Ok(Self::new(
            retriever,
            orchestrator,
            memory,
            config.memory.tool_enabled,
        ))
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// 处理一行输入
    ///
    /// 只有成功生成回答后才成对写入对话记忆；失败的轮次不留下记录。
    pub async fn handle(&self, input: &str) -> Result<TurnOutcome> {
        let query = input.trim();
        if query.is_empty() {
            return Ok(TurnOutcome::Empty);
        }

        match query.to_lowercase().as_str() {
            "exit" | "quit" => return Ok(TurnOutcome::Exit),
            "clear" => {
                self.memory.clear();
                info!("Conversation history cleared");
                return Ok(TurnOutcome::Cleared);
            }
            _ => {}
        }

        match self.run_turn(query).await {
            Ok(answer) => {
                self.memory.record_exchange(query, &answer.text);
                Ok(TurnOutcome::Answered(answer))
            }
            Err(e) => {
                metrics().record_failure(e.stage());
                error!("Turn failed at {} stage: {}", e.stage(), e);
                Err(e)
            }
        }
    }

    async fn run_turn(&self, query: &str) -> Result<Answer> {
        let evidence = self.retriever.retrieve(query, self.top_k).await?;
        self.orchestrator
            .answer(query, &evidence, self.memory_access_enabled)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, GraphFailurePolicy};
    use crate::error::{AppError, Stage};
    use crate::graph::store::MockGraphStore;
    use crate::index::RetryPolicy;
    use crate::index::embedding::MockEmbeddingProvider;
    use crate::index::vector::MockVectorIndex;
    use crate::llm::{MockChatModel, ModelReply};
    use crate::models::VectorMatch;
    use std::time::Duration;

    fn session(model: MockChatModel, vector_fails: bool) -> ChatSession {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|_| Ok(vec![1.0]));
        provider.expect_model_name().return_const("mock".to_string());

        let mut index = MockVectorIndex::new();
        index.expect_query().returning(move |_, _| {
            if vector_fails {
                Err(AppError::VectorQueryFailed("index offline".into()))
            } else {
                Ok(vec![VectorMatch::new("hoan_kiem_lake", 0.9)])
            }
        });

        let mut store = MockGraphStore::new();
        store.expect_ping().returning(|| Ok(()));
        store.expect_neighbors().returning(|_, _| Ok(vec![]));

        let pool = WorkerPool::new(4, Duration::from_secs(120));
        let cache = Arc::new(EmbeddingCache::new(
            Arc::new(provider),
            8,
            RetryPolicy::default(),
        ));
        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(VectorRetriever::new(cache, Arc::new(index))),
            Arc::new(GraphExpander::new(
                Arc::new(store),
                &AppConfig::development().graph,
            )),
            pool.clone(),
            GraphFailurePolicy::Abort,
        ));
        let memory = Arc::new(ConversationMemory::new(2));
        let orchestrator = AnswerOrchestrator::new(Arc::new(model), memory.clone(), pool);
        ChatSession::new(retriever, orchestrator, memory, false)
    }

    fn model_answering(times: usize) -> MockChatModel {
        let mut model = MockChatModel::new();
        model.expect_model_name().return_const("mock".to_string());
        model
            .expect_generate()
            .times(times)
            .returning(|_| Ok(ModelReply::text("Walk around the lake at dawn.")));
        model
    }

    #[tokio::test]
    async fn test_answer_records_pair() {
        let session = session(model_answering(1), false);
        let outcome = session.handle("  Hoan Kiem tips  ").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Answered(_)));
        assert_eq!(
            session.memory().snapshot(),
            "User: Hoan Kiem tips\nAssistant: Walk around the lake at dawn."
        );
    }

    #[tokio::test]
    async fn test_commands() {
        let session = session(model_answering(1), false);
        session.handle("Hoan Kiem tips").await.unwrap();

        assert_eq!(session.handle("CLEAR").await.unwrap(), TurnOutcome::Cleared);
        assert!(session.memory().is_empty());
        assert_eq!(session.handle("quit").await.unwrap(), TurnOutcome::Exit);
        assert_eq!(session.handle("exit").await.unwrap(), TurnOutcome::Exit);
        assert_eq!(session.handle("   ").await.unwrap(), TurnOutcome::Empty);
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_no_history() {
        let session = session(model_answering(0), true);
        let err = session.handle("Hanoi food").await.unwrap_err();

        assert_eq!(err.stage(), Stage::VectorQuery);
        assert!(session.memory().is_empty());
    }
}
