//! 有界工作池
//!
//! 所有外部调用经由工作池派发到独立任务上执行。超出容量的调用排队等待许可，
//! 不阻塞调用方所在的执行上下文。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::error::{AppError, Result, Stage};

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    call_timeout: Duration,
}

impl WorkerPool {
    pub fn new(size: usize, call_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            call_timeout,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.worker_pool_size, config.call_timeout())
    }

    /// 在工作池中执行一次调用
    ///
    /// 超时从获得许可开始计时，超时错误带上 `stage`。
    pub async fn run<F, T>(&self, stage: Stage, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let call_timeout = self.call_timeout;

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| AppError::Internal("worker pool closed".into()))?;

            match tokio::time::timeout(call_timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} call exceeded {:?}", stage, call_timeout);
                    Err(AppError::timeout(
                        stage,
                        format!("exceeded {}s", call_timeout.as_secs()),
                    ))
                }
            }
        });

        handle.await?
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 当前空闲的许可数
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
