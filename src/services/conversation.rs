//! 对话记忆
//!
//! 有界滑动窗口，最多保留 `max_turns * 2` 条消息。超出时成对移除最早的两条，
//! 保持用户消息与助手回复的对齐。实例由调用方构造并共享，不依赖全局状态。

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::config::MemoryConfig;
use crate::models::{ConversationTurn, Role};

/// 无历史时的快照内容
pub const NO_HISTORY: &str = "No previous conversation.";

pub struct ConversationMemory {
    turns: Mutex<VecDeque<ConversationTurn>>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: Mutex::new(VecDeque::with_capacity(max_turns * 2 + 1)),
            max_turns,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_history_turns)
    }

    /// 追加一条消息；追加与裁剪在同一把锁内完成
    pub fn append(&self, role: Role, content: &str) {
        let mut turns = self.turns.lock();
        turns.push_back(ConversationTurn::new(role, content));
        if turns.len() > self.capacity() {
            turns.pop_front();
            turns.pop_front();
        }
    }

    /// 记录一轮完整的问答
    pub fn record_exchange(&self, user: &str, assistant: &str) {
        self.append(Role::User, user);
        self.append(Role::Assistant, assistant);
    }

    /// 以 `Role: content` 逐行渲染的对话记录
    pub fn snapshot(&self) -> String {
        let turns = self.turns.lock();
        if turns.is_empty() {
            return NO_HISTORY.to_string();
        }
        turns
            .iter()
            .map(ConversationTurn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.turns.lock().clear();
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 最多保留的消息条数
    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }
}
