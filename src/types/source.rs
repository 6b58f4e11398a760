use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// 资料来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Academic,
    Book,
    Article,
    Website,
    Report,
    #[default]
    #[serde(other)]
    Other,
}

/// 一条被接受的资料来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// 去重标识：规范化后的URL，无URL时为DOI
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub doi: Option<String>,
    pub source_type: SourceType,
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub key_findings: Option<String>,
    pub summary: String,
    pub full_content: String,
    /// 取值范围 0.0 - 1.0
    pub relevance_score: f64,
    pub relevance_reason: String,
    pub citation_text: String,
    /// 内容是否来自PDF
    pub is_pdf: bool,
}

impl Source {
    pub fn identifier(&self) -> &str {
        &self.id
    }
}

/// 生成来源的去重标识
///
/// URL会去掉片段与末尾斜杠，scheme与host统一小写；DOI统一为小写的裸DOI。
pub fn normalize_identifier(url_or_doi: &str) -> String {
    let raw = url_or_doi.trim();
    let lowered = raw.to_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"] {
        if let Some(doi) = lowered.strip_prefix(prefix) {
            return doi.trim().trim_end_matches('/').to_string();
        }
    }

    match reqwest::Url::parse(raw) {
        Ok(mut url) if url.has_host() => {
            url.set_fragment(None);
            url.to_string().trim_end_matches('/').to_string()
        }
        _ => lowered.trim_end_matches('/').to_string(),
    }
}

/// 按插入顺序保存、按标识去重的来源集合
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: Vec<Source>,
    seen: HashSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入来源，标识已存在时返回false
    pub fn insert(&mut self, source: Source) -> bool {
        if !self.seen.insert(source.id.clone()) {
            return false;
        }
        self.sources.push(source);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn into_vec(self) -> Vec<Source> {
        self.sources
    }
}

/// 调研阶段的产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub sources: Vec<Source>,
    pub research_summary: String,
    pub research_gaps: String,
    pub recommendations: String,
    pub total_sources_found: usize,
    pub pdf_sources_count: usize,
    pub web_sources_count: usize,
    /// 实际使用的检索轮次
    pub attempts: u32,
    /// 每一轮使用的检索语句
    pub queries: Vec<Vec<String>>,
}

impl ResearchResult {
    pub fn new(
        sources: Vec<Source>,
        research_summary: String,
        research_gaps: String,
        recommendations: String,
        attempts: u32,
        queries: Vec<Vec<String>>,
    ) -> Self {
        let pdf_sources_count = sources.iter().filter(|s| s.is_pdf).count();
        Self {
            total_sources_found: sources.len(),
            web_sources_count: sources.len() - pdf_sources_count,
            pdf_sources_count,
            sources,
            research_summary,
            research_gaps,
            recommendations,
            attempts,
            queries,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// 接受前的校验：来源数量达标且标识不重复
    pub fn validate(&self, min_sources: usize) -> Result<(), PipelineError> {
        let mut seen = HashSet::new();
        let unique = self
            .sources
            .iter()
            .filter(|s| seen.insert(s.id.as_str()))
            .count();
        if unique != self.sources.len() || unique < min_sources {
            return Err(PipelineError::InsufficientSources {
                found: unique,
                required: min_sources,
                attempts: self.attempts,
            });
        }
        Ok(())
    }

    /// 按相关度降序取前n条来源
    pub fn top_sources(&self, n: usize) -> Vec<&Source> {
        let mut ranked: Vec<&Source> = self.sources.iter().collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, score: f64) -> Source {
        Source {
            id: id.to_string(),
            title: format!("Title {}", id),
            url: Some(id.to_string()),
            doi: None,
            source_type: SourceType::Article,
            authors: vec![],
            publication_year: None,
            abstract_text: None,
            key_findings: None,
            summary: "summary".to_string(),
            full_content: "content".to_string(),
            relevance_score: score,
            relevance_reason: String::new(),
            citation_text: String::new(),
            is_pdf: false,
        }
    }

    #[test]
    fn test_normalize_identifier_strips_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_identifier("HTTPS://Example.ORG/paper/#section-2"),
            "https://example.org/paper"
        );
        assert_eq!(
            normalize_identifier("https://example.org/paper/"),
            normalize_identifier("https://example.org/paper")
        );
        assert_eq!(
            normalize_identifier("doi:10.1000/XYZ123"),
            normalize_identifier("https://doi.org/10.1000/xyz123")
        );
    }

    #[test]
    fn test_source_set_deduplicates_by_identifier() {
        let mut set = SourceSet::new();
        assert!(set.insert(source("https://a.org/1", 0.5)));
        assert!(!set.insert(source("https://a.org/1", 0.9)));
        assert!(set.insert(source("https://a.org/2", 0.7)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().relevance_score, 0.5);
    }

    #[test]
    fn test_research_result_counts_and_validation() {
        let mut sources: Vec<Source> = (0..10)
            .map(|i| source(&format!("https://a.org/{}", i), 0.1 * i as f64))
            .collect();
        sources[0].is_pdf = true;
        let result = ResearchResult::new(
            sources,
            "summary".into(),
            String::new(),
            String::new(),
            1,
            vec![],
        );
        assert_eq!(result.total_sources_found, 10);
        assert_eq!(result.pdf_sources_count, 1);
        assert_eq!(result.web_sources_count, 9);
        assert!(result.validate(10).is_ok());
        assert!(result.validate(11).is_err());

        let top = result.top_sources(2);
        assert_eq!(top[0].id, "https://a.org/9");
        assert_eq!(top[1].id, "https://a.org/8");
    }

    #[test]
    fn test_validation_rejects_duplicate_identifiers() {
        let sources = vec![source("https://a.org/1", 0.5), source("https://a.org/1", 0.5)];
        let result = ResearchResult::new(sources, String::new(), String::new(), String::new(), 1, vec![]);
        assert!(result.validate(1).is_err());
    }
}
