//! 服务模块

pub mod chat;
pub mod conversation;
pub mod hybrid;
pub mod orchestrator;
pub mod retrieval;
pub mod worker_pool;

pub use chat::{ChatSession, TurnOutcome};
pub use conversation::{ConversationMemory, NO_HISTORY};
pub use hybrid::HybridRetriever;
pub use orchestrator::{Answer, AnswerOrchestrator, AnswerPath};
pub use retrieval::{DEFAULT_TOP_K, VectorRetriever};
pub use worker_pool::WorkerPool;
