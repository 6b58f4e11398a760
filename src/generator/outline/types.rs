use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 模型生成的大纲草稿
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutlineDraft {
    /// Top-level sections in reading order, each with its subsections
    pub structure: Vec<DraftSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftSection {
    pub section: DraftNode,
    #[serde(default)]
    pub subsections: Vec<DraftNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftNode {
    pub title: String,
    /// abstract, introduction, literature_review, methodology, results, discussion, conclusion, subsection or body
    #[serde(rename = "type", default)]
    pub section_type: String,
    /// Target word count, a positive integer
    pub word_count: i64,
    #[serde(default)]
    pub order: i64,
    /// Title of the parent top-level section, empty string for top-level sections
    #[serde(default)]
    pub parent_section: String,
}
