//! 回答编排
//!
//! 两种状态：直接回答，或在模型请求对话历史后带上历史再生成一次。
//! 最多一次额外往返，第二次调用的结果即为最终结果。

use derive_more::Display;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{AppError, Result, Stage};
use crate::llm::{
    ChatModel, GenerationRequest, MEMORY_TOOL_NAME, ModelReply, PromptBuilder, ToolDeclaration,
};
use crate::models::HybridEvidence;
use crate::observability::metrics;
use crate::services::conversation::ConversationMemory;
use crate::services::worker_pool::WorkerPool;

/// 本轮回答经过的路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AnswerPath {
    #[display("direct")]
    Direct,
    #[display("memory")]
    MemoryAugmented,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub path: AnswerPath,
}

pub struct AnswerOrchestrator {
    model: Arc<dyn ChatModel>,
    memory: Arc<ConversationMemory>,
    prompts: PromptBuilder,
    pool: WorkerPool,
}

impl AnswerOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>, memory: Arc<ConversationMemory>, pool: WorkerPool) -> Self {
        Self {
            model,
            memory,
            prompts: PromptBuilder::default(),
            pool,
        }
    }

    /// 生成本轮回答；记录对话记忆由调用方负责
    #[instrument(skip(self, query, evidence), fields(model = self.model.model_name()))]
    pub async fn answer(
        &self,
        query: &str,
        evidence: &HybridEvidence,
        memory_access_enabled: bool,
    ) -> Result<Answer> {
        let prompt = self.prompts.build(query, evidence);
        let tools = if memory_access_enabled {
            vec![ToolDeclaration::conversation_history()]
        } else {
            Vec::new()
        };

        let first = self
            .generate(
                GenerationRequest {
                    system: prompt.system.clone(),
                    user: prompt.user.clone(),
                    tools,
                },
                AnswerPath::Direct,
            )
            .await?;

        if memory_access_enabled && first.requests_tool(MEMORY_TOOL_NAME) {
            let history = self.memory.snapshot();
            info!("Model requested conversation history ({} turns)", self.memory.len());

            let second = self
                .generate(
                    GenerationRequest {
                        system: prompt.system,
                        user: format!("{}\n\nConversation history:\n{}", prompt.user, history),
                        tools: Vec::new(),
                    },
                    AnswerPath::MemoryAugmented,
                )
                .await?;

            return Self::finish(second, AnswerPath::MemoryAugmented);
        }

        Self::finish(first, AnswerPath::Direct)
    }

    /// 每次模型调用按所在路径计数
    async fn generate(&self, request: GenerationRequest, path: AnswerPath) -> Result<ModelReply> {
        let model = self.model.clone();
        metrics().record_generation(&path.to_string());
        debug!("Generation request ({}): {} chars", path, request.user.len());
        self.pool
            .run(Stage::Generation, async move { model.generate(&request).await })
            .await
            .map_err(|e| match e {
                AppError::GenerationFailed(_) | AppError::Timeout { .. } => e,
                other => AppError::GenerationFailed(other.to_string()),
            })
    }

    fn finish(reply: ModelReply, path: AnswerPath) -> Result<Answer> {
        match reply.text {
            Some(text) if !text.trim().is_empty() => Ok(Answer { text, path }),
            _ => Err(AppError::GenerationFailed(
                "model returned no text".to_string(),
            )),
        }
    }
}
