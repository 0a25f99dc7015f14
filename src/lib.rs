//! Tripwise - 混合检索旅行规划助手
//!
//! 结合向量索引的语义检索与知识图谱的一跳扩展，为生成模型提供有依据的上下文，
//! 并在模型需要时通过一次工具往返补充对话历史。

pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
