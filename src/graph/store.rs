//! 图存储抽象

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::GraphConfig;
use crate::error::{AppError, Result};

/// 图存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphStoreError {
    /// 无法建立连接
    #[error("连接不可用: {0}")]
    Unavailable(String),

    /// 单个查询失败
    #[error("查询失败: {0}")]
    Query(String),
}

/// 一跳邻居
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NeighborRecord {
    pub relation: String,
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// 连接检查
    async fn ping(&self) -> std::result::Result<(), GraphStoreError>;

    /// 查询与 `id` 直接相连的实体，最多 `limit` 条，顺序由存储决定
    async fn neighbors(
        &self,
        id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<NeighborRecord>, GraphStoreError>;
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    name: Option<String>,
    kind: Option<String>,
    description: Option<String>,
    labels: Vec<String>,
}

/// 进程内图存储（开发与测试用），关系按无向处理
pub struct InMemoryGraphStore {
    nodes: DashMap<String, NodeRecord>,
    edges: DashMap<String, Vec<(String, String)>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
        }
    }

    pub fn add_node(
        &self,
        id: &str,
        name: &str,
        kind: Option<&str>,
        description: Option<&str>,
        labels: &[&str],
    ) {
        self.nodes.insert(
            id.to_string(),
            NodeRecord {
                name: Some(name.to_string()),
                kind: kind.map(str::to_string),
                description: description.map(str::to_string),
                labels: labels.iter().map(|l| l.to_string()).collect(),
            },
        );
    }

    pub fn add_relation(&self, source: &str, relation: &str, target: &str) {
        self.edges
            .entry(source.to_string())
            .or_default()
            .push((relation.to_string(), target.to_string()));
        if source != target {
            self.edges
                .entry(target.to_string())
                .or_default()
                .push((relation.to_string(), source.to_string()));
        }
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ping(&self) -> std::result::Result<(), GraphStoreError> {
        Ok(())
    }

    async fn neighbors(
        &self,
        id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<NeighborRecord>, GraphStoreError> {
        if id.trim().is_empty() {
            return Err(GraphStoreError::Query("empty entity id".into()));
        }

        let Some(edges) = self.edges.get(id) else {
            return Ok(Vec::new());
        };

        Ok(edges
            .iter()
            .filter_map(|(relation, target)| {
                let node = self.nodes.get(target)?;
                Some(NeighborRecord {
                    relation: relation.clone(),
                    id: target.clone(),
                    name: node.name.clone(),
                    kind: node.kind.clone(),
                    description: node.description.clone(),
                    labels: node.labels.clone(),
                })
            })
            .take(limit)
            .collect())
    }
}

pub async fn create_graph_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend.as_str() {
        "neo4j" => Ok(Arc::new(
            crate::graph::neo4j::Neo4jGraphStore::connect(config).await?,
        )),
        "memory" => Ok(Arc::new(InMemoryGraphStore::new())),
        other => Err(AppError::Config(format!("unknown graph backend: {}", other))),
    }
}
