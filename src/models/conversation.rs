use derive_more::Display;
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 用户消息
    #[display("User")]
    User,
    /// 助手消息
    #[display("Assistant")]
    Assistant,
}

/// 对话轮次中的一条消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    /// 以 `Role: content` 形式渲染
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}
