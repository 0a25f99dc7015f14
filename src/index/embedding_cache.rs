//! 嵌入缓存
//!
//! 按原文精确匹配缓存向量。淘汰顺序为严格的插入顺序（FIFO）：
//! 命中不会刷新条目位置，容量超出时总是淘汰最早插入的文本。

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{AppError, Result};
use crate::index::embedding::{EmbeddingError, EmbeddingProvider};
use crate::observability::metrics;

/// 不可变的嵌入向量
pub type EmbeddingVector = Arc<[f32]>;

/// 重试策略：指数退避，不加抖动
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试前的延迟，之后每次翻倍
    pub base_delay: Duration,
    /// 单次上游调用的超时上限
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.backoff_base(),
            request_timeout: config.request_timeout(),
        }
    }

    /// 第 `retry` 次重试（从 1 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

#[derive(Default)]
struct FifoState {
    entries: HashMap<String, EmbeddingVector>,
    order: VecDeque<String>,
}

/// 带容量上限的嵌入缓存
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    state: Mutex<FifoState>,
    capacity: usize,
    retry: RetryPolicy,
    expected_dimension: Option<usize>,
}

impl EmbeddingCache {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, capacity: usize, retry: RetryPolicy) -> Self {
        Self {
            provider,
            state: Mutex::new(FifoState::default()),
            capacity: capacity.max(1),
            retry,
            expected_dimension: None,
        }
    }

    /// 要求上游返回固定维度的向量
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(provider, config.cache_capacity, RetryPolicy::from_config(config))
    }

    /// 将文本转换为向量
    ///
    /// 命中时不发起网络调用，也不改变淘汰顺序。
    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        if let Some(vector) = self.state.lock().entries.get(text).cloned() {
            metrics().record_cache("hit");
            debug!("Embedding cache hit ({} chars)", text.len());
            return Ok(vector);
        }
        metrics().record_cache("miss");

        let raw = self.fetch_with_retry(text).await?;
        if let Some(dimension) = self.expected_dimension {
            if raw.len() != dimension {
                return Err(AppError::EmbeddingUnavailable {
                    attempts: 1,
                    message: format!(
                        "dimension mismatch: expected {}, got {}",
                        dimension,
                        raw.len()
                    ),
                });
            }
        }

        Ok(self.insert(text, raw.into()))
    }

    async fn fetch_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.retry.request_timeout, self.provider.embed(text))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EmbeddingError::Timeout),
                };

            match result {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Embedding call failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.retry.max_attempts, e, delay
                    );
                    metrics().embedding_retries.inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "Embedding API failed after {} attempt(s) using {}: {}",
                        attempt,
                        self.provider.model_name(),
                        e
                    );
                    return Err(AppError::EmbeddingUnavailable {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// 插入并在超出容量时淘汰最早插入的条目；插入与淘汰在同一把锁内完成
    fn insert(&self, text: &str, vector: EmbeddingVector) -> EmbeddingVector {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(text) {
            return existing.clone();
        }

        state.entries.insert(text.to_string(), vector.clone());
        state.order.push_back(text.to_string());
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                metrics().record_cache("eviction");
                debug!("Evicted oldest embedding from cache");
            }
        }
        vector
    }

    pub fn contains(&self, text: &str) -> bool {
        self.state.lock().entries.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
