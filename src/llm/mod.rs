//! 生成模型模块

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiChatModel;
pub use prompt::{PromptBuilder, RenderedPrompt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::Result;

/// 对话记忆工具名
pub const MEMORY_TOOL_NAME: &str = "get_conversation_history";

/// 提供给模型的可调用能力（无参数）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
}

impl ToolDeclaration {
    /// 对话记忆工具
    pub fn conversation_history() -> Self {
        Self {
            name: MEMORY_TOOL_NAME.to_string(),
            description: "Retrieve recent conversation. Use when user references previous messages."
                .to_string(),
        }
    }
}

/// 一次生成请求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub tools: Vec<ToolDeclaration>,
}

/// 模型回复：文本，或者调用某个能力的意图
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub tool_calls: Vec<String>,
}

impl ModelReply {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: &str) -> Self {
        Self {
            text: None,
            tool_calls: vec![name.to_string()],
        }
    }

    pub fn requests_tool(&self, name: &str) -> bool {
        self.tool_calls.iter().any(|call| call == name)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<ModelReply>;
    fn model_name(&self) -> &str;
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(GeminiChatModel::new(config)?))
}
