//! 可脚本化的替身实现，供单元测试与集成测试驱动完整流水线

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::Config;
use crate::generator::outline::OUTLINE_PROMPT;
use crate::generator::research::{QUERY_REFINEMENT_PROMPT, SOURCE_ANALYSIS_PROMPT, SYNTHESIS_PROMPT};
use crate::llm::LanguageModel;
use crate::sink::{InMemorySink, ProjectSink, ProjectStatus, SinkError};
use crate::tools::{
    PdfExtractor, PdfInput, ScrapeOutcome, ScrapeTool, SearchHit, SearchTool, ToolError,
};
use crate::types::outline::Outline;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::section::WrittenSection;
use crate::types::source::ResearchResult;

struct Rule {
    needle: String,
    responses: VecDeque<Result<String, String>>,
}

/// 按提示词内容返回预设回复的模型
///
/// 第一条needle出现在系统或用户提示词中的规则生效；回复依次弹出，最后一条会一直重复。
/// 没有匹配规则时返回错误。
#[derive(Default)]
pub struct ScriptedModel {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<I, S>(self, needle: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_results(needle, responses.into_iter().map(|r| Ok(r.into())))
    }

    /// 与on相同，但Err项会让该次调用失败
    pub fn on_results<I>(self, needle: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                needle: needle.to_string(),
                responses: responses.into_iter().collect(),
            });
        }
        self
    }

    /// 所有调用的(系统提示词, 用户提示词)
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(sys, user)| sys.contains(needle) || user.contains(needle))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((system_prompt.to_string(), user_prompt.to_string()));
        }
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| anyhow!("scripted model poisoned"))?;
        let rule = rules
            .iter_mut()
            .find(|r| system_prompt.contains(&r.needle) || user_prompt.contains(&r.needle))
            .ok_or_else(|| anyhow!("no scripted response for prompt"))?;
        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };
        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted rule '{}' has no responses", rule.needle)),
        }
    }
}

type SearchFn = dyn Fn(&str) -> Vec<SearchHit> + Send + Sync;

/// 由闭包决定结果的检索工具
pub struct FnSearch {
    name: String,
    respond: Box<SearchFn>,
    queries: Mutex<Vec<String>>,
}

impl FnSearch {
    pub fn new<F>(name: &str, respond: F) -> Self
    where
        F: Fn(&str) -> Vec<SearchHit> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            respond: Box::new(respond),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchTool for FnSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        let mut hits = (self.respond)(query);
        hits.truncate(limit);
        Ok(hits)
    }
}

/// 固定内容的抓取工具
#[derive(Default)]
pub struct StaticScraper {
    failing: HashSet<String>,
    pdf: HashSet<String>,
}

impl StaticScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing<I: IntoIterator<Item = &'static str>>(mut self, urls: I) -> Self {
        self.failing.extend(urls.into_iter().map(str::to_string));
        self
    }

    pub fn serving_pdf<I: IntoIterator<Item = &'static str>>(mut self, urls: I) -> Self {
        self.pdf.extend(urls.into_iter().map(str::to_string));
        self
    }
}

#[async_trait]
impl ScrapeTool for StaticScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutcome, ToolError> {
        if self.failing.contains(url) {
            return Err(ToolError::Http {
                tool: "static_scraper",
                status: 503,
                url: url.to_string(),
            });
        }
        if self.pdf.contains(url) {
            return Ok(ScrapeOutcome::Pdf(b"%PDF-1.7".to_vec()));
        }
        Ok(ScrapeOutcome::Text(format!(
            "Content fetched from {}. It discusses the research topic in depth.",
            url
        )))
    }
}

/// 返回固定文本的PDF提取器
#[derive(Default)]
pub struct StaticPdf;

impl StaticPdf {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfExtractor for StaticPdf {
    async fn extract_pdf(&self, input: PdfInput) -> Result<String, ToolError> {
        Ok(match input {
            PdfInput::Url(url) => format!("PDF text extracted from {}.", url),
            PdfInput::Bytes(bytes) => format!("PDF text extracted from {} bytes.", bytes.len()),
        })
    }
}

/// 前N次指定操作失败的Sink
pub struct FlakySink {
    inner: Arc<InMemorySink>,
    failures: Mutex<HashMap<&'static str, u32>>,
}

impl FlakySink {
    pub fn new(inner: Arc<InMemorySink>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// operation取save_research、save_outline、save_section、update_status、lookup
    pub fn failing(self, operation: &'static str, times: u32) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(operation, times);
        }
        self
    }

    fn check(&self, operation: &'static str) -> Result<(), SinkError> {
        let mut failures = self
            .failures
            .lock()
            .map_err(|_| SinkError::Persistence("flaky sink poisoned".to_string()))?;
        match failures.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SinkError::Persistence(format!("{} unavailable", operation)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProjectSink for FlakySink {
    async fn save_research(
        &self,
        project_id: ProjectId,
        research: &ResearchResult,
    ) -> Result<(), SinkError> {
        self.check("save_research")?;
        self.inner.save_research(project_id, research).await
    }

    async fn save_outline(&self, project_id: ProjectId, outline: &Outline) -> Result<(), SinkError> {
        self.check("save_outline")?;
        self.inner.save_outline(project_id, outline).await
    }

    async fn save_section(
        &self,
        project_id: ProjectId,
        section: &WrittenSection,
        is_final: bool,
    ) -> Result<(), SinkError> {
        self.check("save_section")?;
        self.inner.save_section(project_id, section, is_final).await
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        note: Option<&str>,
    ) -> Result<(), SinkError> {
        self.check("update_status")?;
        self.inner.update_status(project_id, status, note).await
    }

    async fn lookup(&self, project_id: ProjectId) -> Result<ProjectInfo, SinkError> {
        self.check("lookup")?;
        self.inner.lookup(project_id).await
    }
}

/// n个单词组成的正文
pub fn words(n: usize) -> String {
    vec!["evidence"; n].join(" ")
}

/// 形如 {prefix}{i} 的检索结果
pub fn hits(prefix: &str, range: std::ops::Range<usize>) -> Vec<SearchHit> {
    range
        .map(|i| SearchHit {
            title: format!("Title {}", i),
            url: format!("{}{}", prefix, i),
            snippet: format!("Snippet {}", i),
        })
        .collect()
}

/// 来源分析的模型回复，标题与引用留空
pub fn analysis_json(relevance_score: f64) -> String {
    json!({
        "summary": "The source examines the topic with empirical data.",
        "relevance_score": relevance_score,
        "relevance_reason": "Directly addresses the topic.",
        "source_type": "article",
    })
    .to_string()
}

/// 大纲草稿中的一节，subsections为(标题, 字数, parent_section)
pub fn draft_section(
    title: &str,
    section_type: &str,
    word_count: i64,
    order: i64,
    subsections: &[(&str, i64, &str)],
) -> Value {
    json!({
        "section": {
            "title": title,
            "type": section_type,
            "word_count": word_count,
            "order": order,
            "parent_section": "",
        },
        "subsections": subsections
            .iter()
            .enumerate()
            .map(|(i, (sub, words, parent))| json!({
                "title": sub,
                "type": "subsection",
                "word_count": words,
                "order": i as i64 + 1,
                "parent_section": parent,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn outline_json(sections: Vec<Value>) -> String {
    json!({ "structure": sections }).to_string()
}

/// 写作提示词中标识目标章节的行
pub fn section_needle(title: &str) -> String {
    format!("Section title: {}\n", title)
}

/// 覆盖调研与大纲阶段的模型脚本，写作回复用section_needle另行添加
pub fn pipeline_model(outline: String) -> ScriptedModel {
    ScriptedModel::new()
        .on(SOURCE_ANALYSIS_PROMPT.system_prompt, [analysis_json(0.8)])
        .on(
            SYNTHESIS_PROMPT.system_prompt,
            [r#"{"research_summary":"Remote work raises output for focused tasks.","research_gaps":"Long-term effects.","recommendations":"Longitudinal studies."}"#],
        )
        .on(QUERY_REFINEMENT_PROMPT.system_prompt, [r#"{"queries":[]}"#])
        .on(OUTLINE_PROMPT.system_prompt, [outline])
}

/// 两个顶层章节的大纲：Introduction 500字、Conclusion 300字
pub fn two_section_outline() -> String {
    outline_json(vec![
        draft_section("Introduction", "introduction", 500, 1, &[]),
        draft_section("Conclusion", "conclusion", 300, 2, &[]),
    ])
}

/// 测试用配置：输出目录位于dir，全文目标800字，Sink重试等待极短
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        output_path: dir.join("thesis.docs"),
        ..Default::default()
    };
    config.research.results_per_query = 20;
    config.outline.target_document_words = 800;
    config.sink.data_dir = dir.join("projects");
    config.sink.retry_delay_ms = 1;
    config
}
