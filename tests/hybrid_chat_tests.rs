// 混合检索对话的端到端测试
//
// 使用进程内向量索引与图存储、按关键词生成向量的嵌入服务，以及按脚本回复的模型。

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tripwise::config::{AppConfig, GraphFailurePolicy};
use tripwise::error::{AppError, Result};
use tripwise::graph::{
    GraphExpander, GraphStore, GraphStoreError, InMemoryGraphStore, NeighborRecord,
};
use tripwise::index::{
    EmbeddingCache, EmbeddingError, EmbeddingProvider, InMemoryVectorIndex, RetryPolicy,
};
use tripwise::llm::{ChatModel, GenerationRequest, MEMORY_TOOL_NAME, ModelReply};
use tripwise::services::{
    AnswerOrchestrator, AnswerPath, ChatSession, ConversationMemory, HybridRetriever,
    TurnOutcome, VectorRetriever, WorkerPool,
};

// ============ Fakes ============

struct KeywordEmbedding {
    calls: Mutex<usize>,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        *self.calls.lock() += 1;
        let text = text.to_lowercase();
        let vector = if text.contains("hanoi") {
            vec![1.0, 0.0, 0.0, 0.0]
        } else if text.contains("hue") {
            vec![0.0, 0.0, 1.0, 0.0]
        } else {
            vec![0.9, 0.0, 0.0, 0.4]
        };
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    fn with_replies(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<ModelReply> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::GenerationFailed("script exhausted".into()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct UnreachableGraph;

#[async_trait]
impl GraphStore for UnreachableGraph {
    async fn ping(&self) -> std::result::Result<(), GraphStoreError> {
        Err(GraphStoreError::Unavailable("connection refused".into()))
    }

    async fn neighbors(
        &self,
        _id: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<NeighborRecord>, GraphStoreError> {
        Err(GraphStoreError::Unavailable("connection refused".into()))
    }
}

// ============ Fixtures ============

fn meta(name: &str, kind: &str, city: &str) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        ("name".to_string(), json!(name)),
        ("type".to_string(), json!(kind)),
        ("city".to_string(), json!(city)),
    ])
}

fn travel_index() -> Arc<InMemoryVectorIndex> {
    let index = InMemoryVectorIndex::new(4);
    index
        .upsert(
            "hanoi_old_quarter",
            &[1.0, 0.1, 0.0, 0.0],
            meta("Hanoi Old Quarter", "Attraction", "Hanoi"),
        )
        .unwrap();
    index
        .upsert(
            "hoan_kiem_lake",
            &[0.9, 0.2, 0.0, 0.0],
            meta("Hoan Kiem Lake", "Attraction", "Hanoi"),
        )
        .unwrap();
    index
        .upsert(
            "hue_citadel",
            &[0.0, 0.0, 1.0, 0.0],
            meta("Imperial City", "Attraction", "Hue"),
        )
        .unwrap();
    Arc::new(index)
}

fn travel_graph() -> Arc<InMemoryGraphStore> {
    let graph = InMemoryGraphStore::new();
    graph.add_node("hanoi", "Hanoi", Some("City"), Some("Capital of Vietnam"), &["Entity", "City"]);
    graph.add_node(
        "hanoi_old_quarter",
        "Hanoi Old Quarter",
        Some("Attraction"),
        Some("Maze of 36 merchant streets"),
        &["Entity", "Attraction"],
    );
    graph.add_node(
        "hoan_kiem_lake",
        "Hoan Kiem Lake",
        Some("Attraction"),
        Some("Lake of the Returned Sword. ".repeat(30).as_str()),
        &["Entity", "Attraction"],
    );
    graph.add_node("hue", "Hue", Some("City"), None, &["Entity", "City"]);
    graph.add_relation("hanoi_old_quarter", "Located_In", "hanoi");
    graph.add_relation("hoan_kiem_lake", "Located_In", "hanoi");
    graph.add_relation("hoan_kiem_lake", "Near", "hanoi_old_quarter");
    graph.add_relation("hue_citadel", "Located_In", "hue");
    Arc::new(graph)
}

struct Harness {
    session: ChatSession,
    retriever: Arc<HybridRetriever>,
    model: Arc<ScriptedModel>,
    embedding: Arc<KeywordEmbedding>,
}

fn harness(
    replies: Vec<ModelReply>,
    memory_access_enabled: bool,
    graph: Arc<dyn GraphStore>,
    policy: GraphFailurePolicy,
) -> Harness {
    let config = AppConfig::development();
    let pool = WorkerPool::new(4, Duration::from_secs(120));

    let embedding = Arc::new(KeywordEmbedding {
        calls: Mutex::new(0),
    });
    let index = travel_index();
    let cache = Arc::new(
        EmbeddingCache::new(embedding.clone(), 16, RetryPolicy::default()).with_dimension(4),
    );
    let vector = Arc::new(VectorRetriever::new(cache, index).with_top_k(2));
    let expander = Arc::new(GraphExpander::new(graph, &config.graph));
    let retriever = Arc::new(HybridRetriever::new(vector, expander, pool.clone(), policy));

    let model = Arc::new(ScriptedModel::with_replies(replies));
    let memory = Arc::new(ConversationMemory::new(config.memory.max_history_turns));
    let orchestrator = AnswerOrchestrator::new(model.clone(), memory.clone(), pool);
    let session = ChatSession::new(retriever.clone(), orchestrator, memory, memory_access_enabled);

    Harness {
        session,
        retriever,
        model,
        embedding,
    }
}

// ============ Scenarios ============

#[tokio::test]
async fn test_hanoi_query_grounds_answer_in_both_sources() {
    let h = harness(
        vec![ModelReply::text("Day 1: Old Quarter. Day 2: Hoan Kiem Lake.")],
        false,
        travel_graph(),
        GraphFailurePolicy::Abort,
    );

    let evidence = h.retriever.retrieve("3 days in Hanoi", None).await.unwrap();
    assert_eq!(evidence.match_ids(), vec!["hanoi_old_quarter", "hoan_kiem_lake"]);
    assert!(evidence.facts.iter().any(|f| f.source_id == "hanoi_old_quarter"));
    assert!(evidence.facts.iter().any(|f| f.source_id == "hoan_kiem_lake"));
    assert!(
        evidence
            .facts
            .iter()
            .all(|f| f.target_description.chars().count() <= 400)
    );

    let outcome = h.session.handle("3 days in Hanoi").await.unwrap();
    let TurnOutcome::Answered(answer) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(answer.text, "Day 1: Old Quarter. Day 2: Hoan Kiem Lake.");
    assert_eq!(answer.path, AnswerPath::Direct);

    let requests = h.model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_empty());
    assert!(requests[0].user.contains("id: hanoi_old_quarter"));
    assert!(requests[0].user.contains("id: hoan_kiem_lake"));
    assert!(requests[0].user.contains("(hanoi_old_quarter) -[Located_In]-> (hanoi) Hanoi"));
    assert!(requests[0].user.contains("(hoan_kiem_lake) -[Near]-> (hanoi_old_quarter)"));

    // 同一查询第二次检索命中嵌入缓存
    assert_eq!(*h.embedding.calls.lock(), 1);
}

#[tokio::test]
async fn test_follow_up_uses_single_memory_round_trip() {
    let h = harness(
        vec![
            ModelReply::text("Day 1: Old Quarter street food. Day 2: Hoan Kiem Lake at dawn."),
            ModelReply::tool_call(MEMORY_TOOL_NAME),
            ModelReply::text("Old Quarter, then the lake."),
        ],
        true,
        travel_graph(),
        GraphFailurePolicy::Abort,
    );

    h.session.handle("3 days in Hanoi").await.unwrap();
    let outcome = h.session.handle("make it shorter").await.unwrap();

    let TurnOutcome::Answered(answer) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(answer.text, "Old Quarter, then the lake.");
    assert_eq!(answer.path, AnswerPath::MemoryAugmented);

    let requests = h.model.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].tools.iter().any(|t| t.name == MEMORY_TOOL_NAME));
    assert!(requests[2].tools.is_empty());
    assert!(requests[2].user.contains("Conversation history:"));
    assert!(requests[2].user.contains("User: 3 days in Hanoi"));
    assert!(requests[2].user.contains("Assistant: Day 1: Old Quarter street food."));

    assert_eq!(h.session.memory().len(), 4);
}

#[tokio::test]
async fn test_unreachable_graph_aborts_turn() {
    let h = harness(
        vec![ModelReply::text("unused")],
        false,
        Arc::new(UnreachableGraph),
        GraphFailurePolicy::Abort,
    );

    let err = h.session.handle("3 days in Hanoi").await.unwrap_err();
    assert!(matches!(err, AppError::GraphUnavailable(_)));
    assert!(h.model.requests().is_empty());
    assert!(h.session.memory().is_empty());
}

#[tokio::test]
async fn test_unreachable_graph_vector_only_policy() {
    let h = harness(
        vec![ModelReply::text("Visit the Imperial City.")],
        false,
        Arc::new(UnreachableGraph),
        GraphFailurePolicy::VectorOnly,
    );

    let evidence = h.retriever.retrieve("Hue in a day", None).await.unwrap();
    assert!(evidence.graph_degraded);
    assert_eq!(evidence.matches[0].id, "hue_citadel");

    let outcome = h.session.handle("Hue in a day").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    let requests = h.model.requests();
    assert!(requests[0].user.contains("id: hue_citadel"));
}
