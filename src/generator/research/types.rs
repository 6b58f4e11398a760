use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::source::SourceType;

/// 模型对单个候选来源的分析
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceAnalysis {
    /// Cleaned-up title of the source
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub key_findings: Option<String>,
    /// Summary of the source in 2-4 sentences
    pub summary: String,
    /// Relevance to the research topic, between 0.0 and 1.0
    pub relevance_score: f64,
    #[serde(default)]
    pub relevance_reason: String,
    /// Reference entry formatted in the requested citation style
    #[serde(default)]
    pub citation_text: String,
}

/// 调研综述
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchSynthesis {
    /// Overall research summary and main themes
    pub research_summary: String,
    /// Identified research gaps
    #[serde(default)]
    pub research_gaps: String,
    /// Recommended research directions
    #[serde(default)]
    pub recommendations: String,
}

/// 来源不足时模型给出的改写检索语句
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuerySuggestions {
    /// Alternative search queries using synonyms, related terms or acronyms
    pub queries: Vec<String>,
}
