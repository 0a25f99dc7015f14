use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 向量检索命中
///
/// 顺序由向量索引决定（按相关度降序），客户端不做重排。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    /// 实体标识，同时也是知识图谱中的节点 id
    pub id: String,

    /// 相关度得分
    pub score: f32,

    /// 透传的元数据（name、type、city、tags 等，均为可选）
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorMatch {
    pub fn new(id: &str, score: f32) -> Self {
        Self {
            id: id.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 读取字符串元数据；空字符串视为缺失
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.meta_str("name")
    }

    pub fn kind(&self) -> Option<&str> {
        self.meta_str("type")
    }

    pub fn city(&self) -> Option<&str> {
        self.meta_str("city")
    }

    /// 标签可以是字符串数组，也可以是逗号分隔的字符串
    pub fn tags(&self) -> Vec<String> {
        match self.metadata.get("tags") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// 知识图谱事实：source -[relation]-> target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GraphFact {
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
    pub target_name: String,
    pub target_type: Option<String>,
    /// 已截断的描述
    pub target_description: String,
    pub target_labels: Vec<String>,
}

/// 扩展失败而被跳过的实体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedId {
    pub id: String,
    pub reason: String,
}

/// 单次查询的混合证据
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HybridEvidence {
    /// 向量检索结果
    pub matches: Vec<VectorMatch>,

    /// 图谱邻居事实
    pub facts: Vec<GraphFact>,

    /// 扩展失败的实体（不影响本轮继续）
    pub skipped: Vec<SkippedId>,

    /// 图数据库不可用且策略允许时为 true，此时 facts 为空
    pub graph_degraded: bool,
}

impl HybridEvidence {
    pub fn new(matches: Vec<VectorMatch>, facts: Vec<GraphFact>) -> Self {
        Self {
            matches,
            facts,
            skipped: Vec::new(),
            graph_degraded: false,
        }
    }

    /// 按顺序返回所有命中的 id
    pub fn match_ids(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_metadata_is_absent() {
        let m = VectorMatch::new("hanoi_old_quarter", 0.91)
            .with_meta("name", "Old Quarter")
            .with_meta("city", "");

        assert_eq!(m.name(), Some("Old Quarter"));
        assert_eq!(m.city(), None);
        assert_eq!(m.kind(), None);
    }

    #[test]
    fn test_tags_array_and_string() {
        let a = VectorMatch::new("a", 0.5).with_meta("tags", json!(["food", "", "night"]));
        assert_eq!(a.tags(), vec!["food", "night"]);

        let b = VectorMatch::new("b", 0.5).with_meta("tags", "lake, walk");
        assert_eq!(b.tags(), vec!["lake", "walk"]);
    }

    #[test]
    fn test_match_metadata_deserialize_without_field() {
        let m: VectorMatch = serde_json::from_str(r#"{"id":"x","score":0.3}"#).unwrap();
        assert!(m.metadata.is_empty());
    }

    #[test]
    fn test_match_ids_preserve_order() {
        let evidence = HybridEvidence::new(
            vec![VectorMatch::new("b", 0.9), VectorMatch::new("a", 0.8)],
            Vec::new(),
        );
        assert_eq!(evidence.match_ids(), vec!["b", "a"]);
    }
}
