//! 嵌入模型服务

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::error::{AppError, Result};

/// 上游嵌入调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// 请求超时
    #[error("请求超时")]
    Timeout,

    /// 非 2xx 状态码
    #[error("HTTP 状态 {status}: {body}")]
    Status { status: u16, body: String },

    /// 连接失败等网络错误
    #[error("网络错误: {0}")]
    Transport(String),

    /// 响应无法解析为向量
    #[error("响应格式错误: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    /// 是否为可重试的瞬时失败（超时或 HTTP 错误状态）
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Timeout | EmbeddingError::Status { .. })
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbeddingError::Timeout
        } else if let Some(status) = e.status() {
            EmbeddingError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else if e.is_decode() {
            EmbeddingError::Malformed(e.to_string())
        } else {
            EmbeddingError::Transport(e.to_string())
        }
    }
}

/// 嵌入上游服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;
    fn model_name(&self) -> &str;
}

/// 上游可能返回扁平向量，也可能返回嵌套一层的向量
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
    Error { error: String },
}

/// 将上游响应规范化为扁平向量
pub fn normalize_embedding(body: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
    let payload: EmbeddingPayload = serde_json::from_str(body).map_err(|e| {
        EmbeddingError::Malformed(format!(
            "{}: {}",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })?;

    let vector = match payload {
        EmbeddingPayload::Flat(v) => v,
        EmbeddingPayload::Nested(v) => v.into_iter().next().unwrap_or_default(),
        EmbeddingPayload::Error { error } => return Err(EmbeddingError::Malformed(error)),
    };

    if vector.is_empty() {
        return Err(EmbeddingError::Malformed("empty embedding".into()));
    }
    Ok(vector)
}

/// Hugging Face Inference API 嵌入客户端
pub struct HuggingFaceEmbeddingProvider {
    client: reqwest::Client,
    model_name: String,
    url: String,
    api_key: String,
}

impl HuggingFaceEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            model_name: config.model_name.clone(),
            url: format!(
                "{}/models/{}",
                config.api_url.trim_end_matches('/'),
                config.model_name
            ),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "inputs": text,
                "options": { "wait_for_model": true }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        normalize_embedding(&body)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Ollama Embedding 模型客户端
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            model_name: config.model_name.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": [text],
                "truncate": true
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: OllamaEmbedResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::Malformed("Ollama returned no embedding".into()))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.backend.as_str() {
        "huggingface" => Ok(Arc::new(HuggingFaceEmbeddingProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbeddingProvider::new(config)?)),
        other => Err(AppError::Config(format!(
            "unknown embedding backend: {}",
            other
        ))),
    }
}
