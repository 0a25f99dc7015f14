//! 可观测性模块
//!
//! 提供结构化日志初始化和 Prometheus 指标。

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::Stage;

// ===== Logging =====

/// 初始化全局日志订阅者
///
/// `RUST_LOG` 优先于配置中的级别。配置了 `log_dir` 时日志按天滚动写入文件，
/// 返回的 guard 必须在进程生命周期内保持存活。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if config.level.is_empty() { "info" } else { &config.level }));
    let registry = tracing_subscriber::registry().with(filter);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tripwise.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let result = if config.structured {
                registry
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init()
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init()
            };
            if result.is_err() {
                eprintln!("tracing subscriber already initialised");
            }
            Some(guard)
        }
        None => {
            let result = if config.structured {
                registry.with(fmt::layer().json()).try_init()
            } else {
                registry.with(fmt::layer()).try_init()
            };
            if result.is_err() {
                eprintln!("tracing subscriber already initialised");
            }
            None
        }
    }
}

// ===== Metrics =====

/// 应用指标
pub struct Metrics {
    registry: Registry,
    pub embedding_cache: IntCounterVec,
    pub embedding_retries: IntCounter,
    pub vector_queries: IntCounter,
    pub graph_facts: IntCounter,
    pub graph_skipped_ids: IntCounter,
    pub generation_calls: IntCounterVec,
    pub turn_failures: IntCounterVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("tripwise".into()), None)?;

        let embedding_cache = IntCounterVec::new(
            Opts::new("embedding_cache_events_total", "Embedding cache hits, misses and evictions"),
            &["event"],
        )?;
        let embedding_retries =
            IntCounter::new("embedding_retries_total", "Embedding upstream retries")?;
        let vector_queries = IntCounter::new("vector_queries_total", "Vector index queries")?;
        let graph_facts = IntCounter::new("graph_facts_total", "Graph facts fetched")?;
        let graph_skipped_ids =
            IntCounter::new("graph_skipped_ids_total", "Entity ids skipped during expansion")?;
        let generation_calls = IntCounterVec::new(
            Opts::new("generation_calls_total", "Answering model calls"),
            &["path"],
        )?;
        let turn_failures = IntCounterVec::new(
            Opts::new("turn_failures_total", "Failed turns by stage"),
            &["stage"],
        )?;

        registry.register(Box::new(embedding_cache.clone()))?;
        registry.register(Box::new(embedding_retries.clone()))?;
        registry.register(Box::new(vector_queries.clone()))?;
        registry.register(Box::new(graph_facts.clone()))?;
        registry.register(Box::new(graph_skipped_ids.clone()))?;
        registry.register(Box::new(generation_calls.clone()))?;
        registry.register(Box::new(turn_failures.clone()))?;

        Ok(Self {
            registry,
            embedding_cache,
            embedding_retries,
            vector_queries,
            graph_facts,
            graph_skipped_ids,
            generation_calls,
            turn_failures,
        })
    }

    pub fn record_cache(&self, event: &str) {
        self.embedding_cache.with_label_values(&[event]).inc();
    }

    pub fn record_generation(&self, path: &str) {
        self.generation_calls.with_label_values(&[path]).inc();
    }

    pub fn record_failure(&self, stage: Stage) {
        self.turn_failures
            .with_label_values(&[&stage.to_string()])
            .inc();
    }
}

static METRICS: Lazy<Metrics> =
    Lazy::new(|| Metrics::new().expect("static metric definitions are valid"));

/// 全局指标实例
pub fn metrics() -> &'static Metrics {
    &METRICS
}

/// 生成 Prometheus 文本格式指标
pub fn gather() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&METRICS.registry.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
