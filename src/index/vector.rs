//! 向量索引服务

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::VectorConfig;
use crate::error::{AppError, Result};
use crate::models::VectorMatch;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 相似度查询；结果顺序即索引返回的顺序
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;
    fn dimension(&self) -> usize;
}

/// 进程内向量索引（开发与测试用）
pub struct InMemoryVectorIndex {
    vectors: dashmap::DashMap<String, (Vec<f32>, HashMap<String, serde_json::Value>)>,
    dimension: usize,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: dashmap::DashMap::new(),
            dimension,
        }
    }

    pub fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(AppError::VectorQueryFailed(format!(
                "vector for {} has dimension {}, index expects {}",
                id,
                vector.len(),
                self.dimension
            )));
        }
        self.vectors
            .insert(id.to_string(), (vector.to_vec(), metadata));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        if vector.len() != self.dimension {
            return Err(AppError::VectorQueryFailed(format!(
                "query dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut results: Vec<VectorMatch> = self
            .vectors
            .iter()
            .map(|entry| {
                let (id, (stored, metadata)) = entry.pair();
                VectorMatch {
                    id: id.clone(),
                    score: Self::cosine_similarity(vector, stored),
                    metadata: metadata.clone(),
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        results.truncate(top_k);

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ===== Pinecone =====

#[derive(Debug, Clone, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexDescription {
    dimension: usize,
    #[serde(default)]
    metric: String,
    #[serde(default)]
    host: String,
    status: Option<IndexStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

/// Pinecone 索引客户端
pub struct PineconeVectorIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    dimension: usize,
}

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_POLL_LIMIT: u32 = 30;

impl PineconeVectorIndex {
    /// 连接索引
    ///
    /// 无论是否配置了数据面地址都会通过控制面核对索引。未配置地址时由控制面解析；索引不存在且允许创建时，按配置的维度与
    /// 度量创建 serverless 索引并等待就绪。索引维度与配置不一致视为配置错误。
    pub async fn connect(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let host = match &config.index_host {
            Some(host) if !host.is_empty() => {
                let description = Self::describe(&client, config).await?.ok_or_else(|| {
                    AppError::Config(format!(
                        "vector index {} does not exist",
                        config.index_name
                    ))
                })?;
                check_compatible(&description, config)?;
                host.clone()
            }
            _ => Self::resolve_host(&client, config).await?,
        };

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            host: normalize_host(&host),
            dimension: config.dimension,
        })
    }

    async fn resolve_host(client: &reqwest::Client, config: &VectorConfig) -> Result<String> {
        let mut description = match Self::describe(client, config).await? {
            Some(description) => description,
            None if config.create_if_missing => {
                info!(
                    "Creating index {} (dimension {}, metric {})",
                    config.index_name, config.dimension, config.metric
                );
                Self::create(client, config).await?
            }
            None => {
                return Err(AppError::Config(format!(
                    "vector index {} does not exist",
                    config.index_name
                )));
            }
        };

        let mut polls = 0;
        while !description.status.as_ref().is_some_and(|s| s.ready) || description.host.is_empty() {
            if polls >= READY_POLL_LIMIT {
                return Err(AppError::Config(format!(
                    "vector index {} did not become ready",
                    config.index_name
                )));
            }
            polls += 1;
            tokio::time::sleep(READY_POLL_INTERVAL).await;
            description = Self::describe(client, config).await?.ok_or_else(|| {
                AppError::Config(format!("vector index {} disappeared", config.index_name))
            })?;
        }

        check_compatible(&description, config)?;

        info!("Vector index {} ready at {}", config.index_name, description.host);
        Ok(description.host)
    }

    async fn describe(
        client: &reqwest::Client,
        config: &VectorConfig,
    ) -> Result<Option<IndexDescription>> {
        let response = client
            .get(format!(
                "{}/indexes/{}",
                config.control_plane_url.trim_end_matches('/'),
                urlencoding::encode(&config.index_name)
            ))
            .header("Api-Key", &config.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Config(format!(
                "describe index failed ({}): {}",
                status, body
            )));
        }
        Ok(Some(response.json().await?))
    }

    async fn create(client: &reqwest::Client, config: &VectorConfig) -> Result<IndexDescription> {
        let response = client
            .post(format!(
                "{}/indexes",
                config.control_plane_url.trim_end_matches('/')
            ))
            .header("Api-Key", &config.api_key)
            .json(&serde_json::json!({
                "name": config.index_name,
                "dimension": config.dimension,
                "metric": config.metric,
                "spec": {
                    "serverless": { "cloud": config.cloud, "region": config.region }
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Config(format!(
                "create index failed ({}): {}",
                status, body
            )));
        }
        Ok(response.json().await?)
    }
}

/// 索引的维度与度量必须与配置一致
fn check_compatible(description: &IndexDescription, config: &VectorConfig) -> Result<()> {
    if description.dimension != config.dimension {
        return Err(AppError::Config(format!(
            "vector index {} has dimension {}, configuration expects {}",
            config.index_name, description.dimension, config.dimension
        )));
    }
    if !description.metric.is_empty() && description.metric != config.metric {
        return Err(AppError::Config(format!(
            "vector index {} uses metric {}, configuration expects {}",
            config.index_name, description.metric, config.metric
        )));
    }
    Ok(())
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[async_trait]
impl VectorIndex for PineconeVectorIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata: true,
                include_values: false,
            })
            .send()
            .await
            .map_err(|e| AppError::VectorQueryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorQueryFailed(format!(
                "Pinecone query error ({}): {}",
                status, body
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| AppError::VectorQueryFailed(format!("invalid query response: {}", e)))?;
        debug!("Pinecone returned {} matches", parsed.matches.len());
        Ok(parsed.matches)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub async fn create_vector_index(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "pinecone" => Ok(Arc::new(PineconeVectorIndex::connect(config).await?)),
        "memory" => Ok(Arc::new(InMemoryVectorIndex::new(config.dimension))),
        other => Err(AppError::Config(format!("unknown vector backend: {}", other))),
    }
}
