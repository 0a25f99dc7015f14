//! 提示词构建

use std::fmt::Write;

use crate::models::{GraphFact, HybridEvidence, VectorMatch};

const SYSTEM_INSTRUCTION: &str = "You are a travel planning assistant. \
Answer using the semantic search matches and knowledge graph facts supplied with each question. \
Use the matches to find relevant places and the graph facts to check how they relate, \
so that suggested itineraries are realistic for the user's timeframe. \
Keep answers concise and practical, with concrete steps or tips per location where possible. \
If the supplied data does not contain the answer, say that you don't know instead of guessing. \
If the question refers to earlier messages (such as 'it', 'that' or 'make it shorter'), \
call the get_conversation_history tool to retrieve them. \
Cite node ids together with names when referring to specific places.";

/// 渲染后的两段式提示词
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// 确定性地将查询与证据渲染为提示词；超出上限的证据直接丢弃
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_matches: usize,
    max_facts: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_matches: 10,
            max_facts: 20,
        }
    }
}

impl PromptBuilder {
    pub fn new(max_matches: usize, max_facts: usize) -> Self {
        Self {
            max_matches,
            max_facts,
        }
    }

    pub fn build(&self, query: &str, evidence: &HybridEvidence) -> RenderedPrompt {
        let mut user = format!("User query: {}\n\nTop semantic matches:\n", query);
        for m in evidence.matches.iter().take(self.max_matches) {
            user.push_str(&render_match(m));
            user.push('\n');
        }

        user.push_str("\nGraph facts:\n");
        for fact in evidence.facts.iter().take(self.max_facts) {
            user.push_str(&render_fact(fact));
            user.push('\n');
        }

        user.push_str("\nAnswer the user's question.");

        RenderedPrompt {
            system: SYSTEM_INSTRUCTION.to_string(),
            user,
        }
    }
}

fn render_match(m: &VectorMatch) -> String {
    let mut line = format!(
        "- id: {}, name: {}, type: {}, score: {}",
        m.id,
        m.name().unwrap_or_default(),
        m.kind().unwrap_or_default(),
        m.score
    );
    if let Some(city) = m.city() {
        let _ = write!(line, ", city: {}", city);
    }
    line
}

fn render_fact(fact: &GraphFact) -> String {
    format!(
        "- ({}) -[{}]-> ({}) {}: {}",
        fact.source_id, fact.relation, fact.target_id, fact.target_name, fact.target_description
    )
}
