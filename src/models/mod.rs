//! 数据模型模块

pub mod conversation;
pub mod evidence;

pub use conversation::{ConversationTurn, Role};
pub use evidence::{GraphFact, HybridEvidence, SkippedId, VectorMatch};
