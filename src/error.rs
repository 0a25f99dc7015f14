//! 错误处理模块
//!
//! 定义一次对话轮次中各阶段的错误类型。除嵌入调用内部的瞬时失败外，
//! 所有错误都会传播到轮次边界，由调用方决定如何呈现。

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 轮次处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Stage {
    /// 文本向量化
    #[display("embedding")]
    Embedding,
    /// 向量索引查询
    #[display("vector_query")]
    VectorQuery,
    /// 知识图谱邻居扩展
    #[display("graph_expansion")]
    GraphExpansion,
    /// 模型生成
    #[display("generation")]
    Generation,
    /// 与具体阶段无关（配置、内部错误等）
    #[display("runtime")]
    Runtime,
}

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 嵌入服务在所有重试后仍不可用
    #[error("嵌入服务不可用（尝试 {attempts} 次）: {message}")]
    EmbeddingUnavailable { attempts: u32, message: String },

    /// 向量索引查询失败
    #[error("向量索引查询失败: {0}")]
    VectorQueryFailed(String),

    /// 图数据库连接不可用
    #[error("图数据库不可用: {0}")]
    GraphUnavailable(String),

    /// 模型生成失败
    #[error("模型生成失败: {0}")]
    GenerationFailed(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// HTTP 客户端错误
    #[error("HTTP 错误: {0}")]
    Http(String),

    /// 超时错误
    #[error("操作超时 ({stage}): {message}")]
    Timeout { stage: Stage, message: String },

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 返回出错的处理阶段
    pub fn stage(&self) -> Stage {
        match self {
            AppError::EmbeddingUnavailable { .. } => Stage::Embedding,
            AppError::VectorQueryFailed(_) => Stage::VectorQuery,
            AppError::GraphUnavailable(_) => Stage::GraphExpansion,
            AppError::GenerationFailed(_) => Stage::Generation,
            AppError::Timeout { stage, .. } => *stage,
            _ => Stage::Runtime,
        }
    }

    /// 指定阶段的超时错误
    pub fn timeout(stage: Stage, message: impl Into<String>) -> Self {
        AppError::Timeout {
            stage,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("worker task failed: {}", e))
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let err = AppError::EmbeddingUnavailable {
            attempts: 3,
            message: "503".into(),
        };
        assert_eq!(err.stage(), Stage::Embedding);
        assert_eq!(
            AppError::GraphUnavailable("refused".into()).stage(),
            Stage::GraphExpansion
        );
        assert_eq!(
            AppError::timeout(Stage::Generation, "120s").stage(),
            Stage::Generation
        );
        assert_eq!(AppError::Config("x".into()).stage(), Stage::Runtime);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::VectorQuery.to_string(), "vector_query");
        assert_eq!(Stage::GraphExpansion.to_string(), "graph_expansion");
    }
}
