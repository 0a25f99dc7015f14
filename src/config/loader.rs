use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 优先级（后者覆盖前者）：
    /// 1. 开发环境默认值
    /// 2. ./tripwise.toml
    /// 3. TRIPWISE_ 前缀的环境变量（嵌套字段用 `__` 分隔）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("TRIPWISE_").split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.vector.dimension == 0 {
            return Err(ConfigValidationError::InvalidDimension);
        }

        if config.embedding.cache_capacity == 0 {
            return Err(ConfigValidationError::ZeroValue("embedding.cache_capacity"));
        }
        if config.embedding.max_attempts == 0 {
            return Err(ConfigValidationError::ZeroValue("embedding.max_attempts"));
        }
        if config.runtime.worker_pool_size == 0 {
            return Err(ConfigValidationError::ZeroValue("runtime.worker_pool_size"));
        }
        if config.memory.max_history_turns == 0 {
            return Err(ConfigValidationError::ZeroValue("memory.max_history_turns"));
        }

        match config.embedding.backend.as_str() {
            "huggingface" => require_key("embedding.api_key", &config.embedding.api_key)?,
            "ollama" => {}
            other => return Err(ConfigValidationError::UnknownBackend("embedding", other.into())),
        }

        match config.vector.backend.as_str() {
            "pinecone" => require_key("vector.api_key", &config.vector.api_key)?,
            "memory" => {}
            other => return Err(ConfigValidationError::UnknownBackend("vector", other.into())),
        }

        match config.graph.backend.as_str() {
            "neo4j" | "memory" => {}
            other => return Err(ConfigValidationError::UnknownBackend("graph", other.into())),
        }

        require_key("llm.api_key", &config.llm.api_key)?;

        Ok(())
    }
}

fn require_key(field: &'static str, value: &str) -> Result<(), ConfigValidationError> {
    if value.trim().is_empty() {
        return Err(ConfigValidationError::MissingApiKey(field));
    }
    Ok(())
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("向量维度无效，必须大于 0")]
    InvalidDimension,

    #[error("{0} 必须大于 0")]
    ZeroValue(&'static str),

    #[error("未知的 {0} 后端: {1}")]
    UnknownBackend(&'static str, String),

    #[error("缺少 API 密钥: {0}")]
    MissingApiKey(&'static str),
}

impl From<ConfigValidationError> for crate::error::AppError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::AppError::Config(e.to_string())
    }
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("tripwise.toml")
}
