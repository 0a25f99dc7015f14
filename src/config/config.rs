use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding 后端类型: "huggingface" 或 "ollama"
    pub backend: String,
    /// 模型名称
    pub model_name: String,
    /// 推理服务地址（Hugging Face Inference API 或 Ollama 服务器）
    pub api_url: String,
    /// API 密钥
    pub api_key: String,
    /// 单次请求超时（秒），超时视为可重试的瞬时失败
    pub request_timeout_secs: u64,
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 首次退避延迟（毫秒），之后每次翻倍
    pub backoff_base_ms: u64,
    /// 缓存容量（条目数）
    pub cache_capacity: usize,
}

impl EmbeddingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// 向量数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VectorConfig {
    /// 后端类型: "pinecone" 或 "memory"
    pub backend: String,
    /// 索引名称
    pub index_name: String,
    /// API 密钥
    pub api_key: String,
    /// 控制面地址
    pub control_plane_url: String,
    /// 数据面地址；为空时通过控制面解析
    pub index_host: Option<String>,
    /// 向量维度
    pub dimension: usize,
    /// 距离计算方式
    pub metric: String,
    /// Serverless 云厂商
    pub cloud: String,
    /// Serverless 区域
    pub region: String,
    /// 默认返回结果数
    pub top_k: usize,
    /// 索引不存在时是否自动创建
    pub create_if_missing: bool,
}

/// 知识图谱配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GraphConfig {
    /// 后端类型: "neo4j" 或 "memory"
    pub backend: String,
    /// Neo4j 连接地址
    pub uri: String,
    /// 用户名
    pub user: String,
    /// 密码
    pub password: String,
    /// 数据库名称
    pub database: String,
    /// 连接池最大大小
    pub max_connections: usize,
    /// 每个实体最多返回的邻居数
    pub neighbors_per_node: usize,
    /// 邻居描述最大字符数
    pub description_max_chars: usize,
}

/// 语言模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// 模型名称
    pub model_name: String,
    /// API 密钥
    pub api_key: String,
    /// API 基础地址
    pub base_url: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
}

/// 对话记忆配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoryConfig {
    /// 保留的最大轮数（每轮包含用户消息与助手回复）
    pub max_history_turns: usize,
    /// 是否向模型提供对话历史工具
    pub tool_enabled: bool,
}

/// 图数据库不可用时的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphFailurePolicy {
    /// 整个轮次失败
    #[default]
    Abort,
    /// 仅使用向量检索结果继续回答
    VectorOnly,
}

/// 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 工作池大小（同时进行的外部调用上限）
    pub worker_pool_size: usize,
    /// 外部调用的统一超时上限（秒）
    pub call_timeout_secs: u64,
    /// 图数据库不可用时的策略
    pub on_graph_unavailable: GraphFailurePolicy,
}

impl RuntimeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// 向量数据库配置
    pub vector: VectorConfig,
    /// 知识图谱配置
    pub graph: GraphConfig,
    /// 语言模型配置
    pub llm: LlmConfig,
    /// 对话记忆配置
    pub memory: MemoryConfig,
    /// 运行时配置
    pub runtime: RuntimeConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            embedding: EmbeddingConfig {
                backend: "huggingface".into(),
                model_name: "BAAI/bge-base-en-v1.5".into(),
                api_url: "https://api-inference.huggingface.co".into(),
                api_key: String::new(),
                request_timeout_secs: 30,
                max_attempts: 3,
                backoff_base_ms: 1000,
                cache_capacity: 128,
            },
            vector: VectorConfig {
                backend: "pinecone".into(),
                index_name: "vietnam-travel".into(),
                api_key: String::new(),
                control_plane_url: "https://api.pinecone.io".into(),
                index_host: None,
                dimension: 768,
                metric: "cosine".into(),
                cloud: "aws".into(),
                region: "us-east-1".into(),
                top_k: 5,
                create_if_missing: true,
            },
            graph: GraphConfig {
                backend: "neo4j".into(),
                uri: "bolt://localhost:7687".into(),
                user: "neo4j".into(),
                password: String::new(),
                database: "neo4j".into(),
                max_connections: 10,
                neighbors_per_node: 10,
                description_max_chars: 400,
            },
            llm: LlmConfig {
                model_name: "gemini-2.5-flash".into(),
                api_key: String::new(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
                request_timeout_secs: 120,
            },
            memory: MemoryConfig {
                max_history_turns: 2,
                tool_enabled: true,
            },
            runtime: RuntimeConfig {
                worker_pool_size: 4,
                call_timeout_secs: 120,
                on_graph_unavailable: GraphFailurePolicy::Abort,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            app_name: "tripwise".into(),
            environment: "development".into(),
        }
    }
}
