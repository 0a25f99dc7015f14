//! Neo4j 图存储

use async_trait::async_trait;
use neo4rs::{
    ConfigBuilder, Graph, Neo4jClientErrorKind, Neo4jErrorKind, Row, query,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::store::{GraphStore, GraphStoreError, NeighborRecord};
use crate::config::GraphConfig;
use crate::error::{AppError, Result};

const NEIGHBORS_QUERY: &str = "MATCH (n:Entity {id: $nid})-[r]-(m:Entity) \
     RETURN type(r) AS rel, labels(m) AS labels, m.id AS id, m.name AS name, \
     m.type AS type, m.description AS description \
     LIMIT $limit";

/// 兼容本地 Neo4j 与 AuraDB 的图存储
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
}

impl Neo4jGraphStore {
    /// 建立连接并执行一次连通性检查
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        info!("Connecting to Neo4j at: {}", config.uri);

        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .fetch_size(500)
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build Neo4j config: {}", e)))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| AppError::GraphUnavailable(format!("Failed to connect to Neo4j: {}", e)))?;

        let store = Self {
            graph: Arc::new(graph),
        };
        store
            .ping()
            .await
            .map_err(|e| AppError::GraphUnavailable(e.to_string()))?;

        info!("Neo4j connection established");
        Ok(store)
    }
}

/// 区分连接类错误与单次查询错误
///
/// 连接、IO、认证以及服务端的瞬时或会话类错误说明数据库整体不可用；
/// 其余错误只影响当前查询。
fn classify(error: neo4rs::Error) -> GraphStoreError {
    use neo4rs::Error;

    let unavailable = match &error {
        Error::IOError { .. }
        | Error::ConnectionError
        | Error::AuthenticationError(_)
        | Error::UnsupportedScheme(_)
        | Error::InvalidDnsName(_)
        | Error::UrlParseError(_) => true,
        Error::Neo4j(e) => matches!(
            e.kind(),
            Neo4jErrorKind::Transient
                | Neo4jErrorKind::Client(
                    Neo4jClientErrorKind::Security(_)
                        | Neo4jClientErrorKind::SessionExpired
                        | Neo4jClientErrorKind::FatalDiscovery
                )
        ),
        _ => false,
    };

    if unavailable {
        GraphStoreError::Unavailable(error.to_string())
    } else {
        GraphStoreError::Query(error.to_string())
    }
}

/// 缺少关系类型或邻居 id 的行无法构成事实，返回 None
fn to_record(row: &Row) -> Option<NeighborRecord> {
    let relation = row.get::<Option<String>>("rel").ok().flatten()?;
    let id = row.get::<Option<String>>("id").ok().flatten()?;
    Some(NeighborRecord {
        relation,
        id,
        name: row.get::<Option<String>>("name").ok().flatten(),
        kind: row.get::<Option<String>>("type").ok().flatten(),
        description: row.get::<Option<String>>("description").ok().flatten(),
        labels: row.get::<Vec<String>>("labels").unwrap_or_default(),
    })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> std::result::Result<(), GraphStoreError> {
        let mut result = self
            .graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .map_err(|e| GraphStoreError::Unavailable(e.to_string()))?;
        result
            .next()
            .await
            .map_err(|e| GraphStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn neighbors(
        &self,
        id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<NeighborRecord>, GraphStoreError> {
        let mut result = self
            .graph
            .execute(
                query(NEIGHBORS_QUERY)
                    .param("nid", id)
                    .param("limit", limit as i64),
            )
            .await
            .map_err(classify)?;

        let mut neighbors = Vec::new();
        while let Some(row) = result.next().await.map_err(classify)? {
            match to_record(&row) {
                Some(record) => neighbors.push(record),
                None => warn!("Skipping neighbor row without id or relation for {}", id),
            }
        }

        debug!("Neo4j returned {} neighbors for {}", neighbors.len(), id);
        Ok(neighbors)
    }
}
