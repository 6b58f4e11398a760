//! 调研阶段：检索、抓取、分析候选来源，直到满足来源数量要求

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::config::ResearchConfig;
use crate::error::PipelineError;
use crate::generator::agent_executor::{
    PromptMaterial, PromptTemplate, extract, with_generation_retries,
};
use crate::llm::LanguageModel;
use crate::tools::{PdfInput, ResearchTools, ScrapeOutcome, SearchHit, ToolError, looks_like_pdf};
use crate::types::citation::CitationStyle;
use crate::types::source::{ResearchResult, Source, SourceSet, normalize_identifier};
use crate::utils::text::truncate_chars;

pub mod query;
pub mod types;

use query::{QueryPlan, QueryPlanner};
use types::{QuerySuggestions, ResearchSynthesis, SourceAnalysis};

/// 单次生成失败的重试次数
const GENERATION_ATTEMPTS: u32 = 2;

/// 分析提示词中附带的正文长度
const ANALYSIS_CONTENT_CHARS: usize = 6000;

pub const SOURCE_ANALYSIS_PROMPT: PromptTemplate = PromptTemplate {
    system_prompt: "You are an expert academic research analyst. You assess a single candidate source for a research project: you identify its bibliographic details, summarise its content, extract key findings and judge how relevant it is to the research topic.",
    opening_instruction: "Analyse the candidate source below for the given research topic.",
    closing_instruction: "Score relevance strictly between 0.0 and 1.0: unrelated or low-quality content must score below 0.3. Only report authors, years and DOIs that actually appear in the content. Write citation_text as a complete reference entry in the requested citation style.",
};

pub const SYNTHESIS_PROMPT: PromptTemplate = PromptTemplate {
    system_prompt: "You are an expert academic researcher who synthesises a body of sources into a research overview for a thesis.",
    opening_instruction: "Synthesise the accepted sources below into an overall research summary, the research gaps they reveal and recommended research directions.",
    closing_instruction: "Ground every statement in the listed sources.",
};

pub const QUERY_REFINEMENT_PROMPT: PromptTemplate = PromptTemplate {
    system_prompt: "You are a research librarian who refines web search queries when a literature search returns too few sources.",
    opening_instruction: "The searches below did not surface enough relevant sources for the research topic.",
    closing_instruction: "Propose up to three alternative search queries using broader keywords, synonyms, related terms or acronyms. Do not repeat queries that were already used.",
};

/// 候选被排除的原因
#[derive(Debug)]
enum CandidateRejection {
    Tool(ToolError),
    Analysis(String),
    LowRelevance(f64),
}

impl std::fmt::Display for CandidateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateRejection::Tool(e) => write!(f, "tool failure: {}", e),
            CandidateRejection::Analysis(e) => write!(f, "analysis failure: {}", e),
            CandidateRejection::LowRelevance(score) => write!(f, "relevance {:.2} too low", score),
        }
    }
}

/// 调研阶段
pub struct ResearchStage {
    llm: Arc<dyn LanguageModel>,
    tools: ResearchTools,
    config: ResearchConfig,
}

impl ResearchStage {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: ResearchTools, config: ResearchConfig) -> Self {
        Self { llm, tools, config }
    }

    pub fn min_sources(&self) -> usize {
        self.config.min_sources
    }

    /// 执行调研
    ///
    /// 来源跨轮次累积并按标识去重；每轮全部候选处理完后才检查数量要求，
    /// 轮次耗尽仍不足时返回InsufficientSources。
    pub async fn run(
        &self,
        topic: &str,
        citation_style: CitationStyle,
    ) -> Result<ResearchResult, PipelineError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut planner = QueryPlanner::new(topic, self.tools.search.len());
        let mut sources = SourceSet::new();
        let mut rejected: HashSet<String> = HashSet::new();
        let mut queries_used: Vec<Vec<String>> = Vec::new();
        let mut suggestions: Vec<String> = Vec::new();

        for attempt in 1..=max_attempts {
            let plan = planner.plan(attempt, &suggestions);
            info!(
                "🔎 第 {} / {} 轮检索 ({})：{:?}",
                attempt, max_attempts, plan.strategy, plan.queries
            );
            queries_used.push(plan.queries.clone());

            let candidates = self.search_pass(&plan, &sources, &rejected).await;
            let accepted = self
                .process_candidates(candidates, topic, citation_style, &mut rejected)
                .await;
            for source in accepted {
                sources.insert(source);
            }

            if sources.len() >= self.config.min_sources {
                info!(
                    "✅ 来源数量满足要求：{} / {}（第 {} 轮）",
                    sources.len(),
                    self.config.min_sources,
                    attempt
                );
                let sources = sources.into_vec();
                let synthesis = self.synthesize(topic, &sources).await?;
                return Ok(ResearchResult::new(
                    sources,
                    synthesis.research_summary,
                    synthesis.research_gaps,
                    synthesis.recommendations,
                    attempt,
                    queries_used,
                ));
            }

            warn!(
                "⚠️ 来源数量不足：{} / {}，将调整检索策略",
                sources.len(),
                self.config.min_sources
            );
            // 只有下一轮是同义改写时才请求建议
            if attempt < max_attempts && QueryPlanner::needs_suggestions(attempt + 1) {
                suggestions = self.suggest_queries(topic, &queries_used).await;
            }
        }

        Err(PipelineError::InsufficientSources {
            found: sources.len(),
            required: self.config.min_sources,
            attempts: max_attempts,
        })
    }

    /// 执行一轮检索，返回尚未处理过的候选
    async fn search_pass(
        &self,
        plan: &QueryPlan,
        sources: &SourceSet,
        rejected: &HashSet<String>,
    ) -> Vec<SearchHit> {
        let Some(tool) = self.tools.search.get(plan.tool_index) else {
            warn!("⚠️ 没有可用的检索工具");
            return Vec::new();
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        for query in &plan.queries {
            match tool.search(query, self.config.results_per_query).await {
                Ok(hits) => {
                    for hit in hits {
                        let id = normalize_identifier(&hit.url);
                        if sources.contains(&id) || rejected.contains(&id) || !seen.insert(id) {
                            continue;
                        }
                        candidates.push(hit);
                    }
                }
                Err(e) => warn!("⚠️ 检索失败，跳过该检索语句 \"{}\": {}", query, e),
            }
        }
        debug!(count = candidates.len(), tool = tool.name(), "candidates collected");
        candidates
    }

    /// 并发处理一轮的候选，保持检索顺序
    async fn process_candidates(
        &self,
        candidates: Vec<SearchHit>,
        topic: &str,
        citation_style: CitationStyle,
        rejected: &mut HashSet<String>,
    ) -> Vec<Source> {
        let results: Vec<(String, Result<Source, CandidateRejection>)> = stream::iter(candidates)
            .map(|hit| async move {
                let id = normalize_identifier(&hit.url);
                let outcome = self.process_candidate(&hit, &id, topic, citation_style).await;
                (id, outcome)
            })
            .buffered(self.config.max_parallel_fetches.max(1))
            .collect()
            .await;

        let mut accepted = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(source) => {
                    debug!(id = %id, score = source.relevance_score, "source accepted");
                    accepted.push(source);
                }
                Err(reason) => {
                    debug!(id = %id, "候选被排除: {}", reason);
                    rejected.insert(id);
                }
            }
        }
        accepted
    }

    async fn process_candidate(
        &self,
        hit: &SearchHit,
        id: &str,
        topic: &str,
        citation_style: CitationStyle,
    ) -> Result<Source, CandidateRejection> {
        let (content, is_pdf) = self.fetch_content(&hit.url).await.map_err(CandidateRejection::Tool)?;

        let params = SOURCE_ANALYSIS_PROMPT.params(
            &[
                PromptMaterial::new("Research topic", topic),
                PromptMaterial::new(
                    "Citation style",
                    format!(
                        "{}. {}",
                        citation_style.display_name(),
                        citation_style.prompt_instruction()
                    ),
                ),
                PromptMaterial::new(
                    "Candidate source",
                    format!(
                        "Title: {}\nURL: {}\nSearch snippet: {}",
                        hit.title, hit.url, hit.snippet
                    ),
                ),
                PromptMaterial::new("Content", truncate_chars(&content, ANALYSIS_CONTENT_CHARS)),
            ],
            format!("来源分析 {}", hit.url),
        );
        let analysis: SourceAnalysis =
            with_generation_retries(GENERATION_ATTEMPTS, &params.log_tag, || {
                extract(self.llm.as_ref(), &params)
            })
            .await
            .map_err(|e| CandidateRejection::Analysis(e.to_string()))?;

        let score = analysis.relevance_score.clamp(0.0, 1.0);
        if score < self.config.min_relevance_score {
            return Err(CandidateRejection::LowRelevance(score));
        }

        let title = if analysis.title.trim().is_empty() {
            hit.title.clone()
        } else {
            analysis.title.trim().to_string()
        };
        let citation_text = if analysis.citation_text.trim().is_empty() {
            citation_style.format_reference(
                &analysis.authors,
                analysis.publication_year,
                &title,
                Some(&hit.url),
            )
        } else {
            analysis.citation_text.trim().to_string()
        };

        Ok(Source {
            id: id.to_string(),
            title,
            url: Some(hit.url.clone()),
            doi: analysis.doi.filter(|d| !d.trim().is_empty()),
            source_type: analysis.source_type,
            authors: analysis.authors,
            publication_year: analysis.publication_year,
            abstract_text: analysis.abstract_text,
            key_findings: analysis.key_findings,
            summary: analysis.summary,
            full_content: content,
            relevance_score: score,
            relevance_reason: analysis.relevance_reason,
            citation_text,
            is_pdf,
        })
    }

    /// 获取候选正文，PDF交给PDF提取器
    async fn fetch_content(&self, url: &str) -> Result<(String, bool), ToolError> {
        if looks_like_pdf(url) {
            let text = self.tools.pdf.extract_pdf(PdfInput::Url(url.to_string())).await?;
            return Ok((text, true));
        }
        match self.tools.scraper.scrape(url).await? {
            ScrapeOutcome::Text(text) => Ok((text, false)),
            ScrapeOutcome::Pdf(bytes) => {
                let text = self.tools.pdf.extract_pdf(PdfInput::Bytes(bytes)).await?;
                Ok((text, true))
            }
        }
    }

    /// 生成调研综述，只在来源数量达标后调用一次
    async fn synthesize(
        &self,
        topic: &str,
        sources: &[Source],
    ) -> Result<ResearchSynthesis, PipelineError> {
        let listing = sources
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "{}. {} (relevance {:.2})\n   {}\n   Key findings: {}",
                    i + 1,
                    s.title,
                    s.relevance_score,
                    s.summary,
                    s.key_findings.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let params = SYNTHESIS_PROMPT.params(
            &[
                PromptMaterial::new("Research topic", topic),
                PromptMaterial::new("Accepted sources", listing),
            ],
            "调研综述",
        );

        with_generation_retries(GENERATION_ATTEMPTS, &params.log_tag, || {
            extract::<ResearchSynthesis>(self.llm.as_ref(), &params)
        })
        .await
        .map_err(|e| PipelineError::generation("research", e))
    }

    /// 请求模型改写检索语句，失败时返回空列表
    async fn suggest_queries(&self, topic: &str, used: &[Vec<String>]) -> Vec<String> {
        let used_listing = used
            .iter()
            .flatten()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n");
        let params = QUERY_REFINEMENT_PROMPT.params(
            &[
                PromptMaterial::new("Research topic", topic),
                PromptMaterial::new("Queries already used", used_listing),
            ],
            "检索改写",
        );
        match extract::<QuerySuggestions>(self.llm.as_ref(), &params).await {
            Ok(suggestions) => suggestions.queries,
            Err(e) => {
                debug!("检索改写建议获取失败: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FnSearch, ScriptedModel, StaticPdf, StaticScraper, analysis_json, hits};
    use crate::tools::SearchTool;

    fn tools(search: FnSearch, scraper: StaticScraper) -> ResearchTools {
        ResearchTools::new(vec![Arc::new(search)], Arc::new(scraper), Arc::new(StaticPdf::new()))
    }

    fn model(score: f64) -> ScriptedModel {
        ScriptedModel::new()
            .on(SOURCE_ANALYSIS_PROMPT.system_prompt, [analysis_json(score)])
            .on(
                SYNTHESIS_PROMPT.system_prompt,
                [r#"{"research_summary":"Summary","research_gaps":"Gaps","recommendations":"Recs"}"#],
            )
            .on(QUERY_REFINEMENT_PROMPT.system_prompt, [r#"{"queries":[]}"#])
    }

    fn config(min_sources: usize) -> ResearchConfig {
        ResearchConfig {
            min_sources,
            results_per_query: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_pass_meeting_threshold_returns_immediately() {
        let search = FnSearch::new("web", |_| hits("https://a.org/", 0..12));
        let stage = ResearchStage::new(
            Arc::new(model(0.8)),
            tools(search, StaticScraper::new()),
            config(10),
        );

        let result = stage.run("Remote work", CitationStyle::Apa).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.source_count(), 12);
        assert_eq!(result.research_summary, "Summary");
        assert!(result.validate(10).is_ok());
    }

    #[tokio::test]
    async fn test_low_relevance_candidates_are_filtered() {
        let search = FnSearch::new("web", |_| hits("https://a.org/", 0..12));
        let stage = ResearchStage::new(
            Arc::new(model(0.1)),
            tools(search, StaticScraper::new()),
            config(10),
        );

        let err = stage.run("Remote work", CitationStyle::Apa).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientSources {
                found: 0,
                required: 10,
                attempts: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_scrapes_exclude_only_that_candidate() {
        let search = FnSearch::new("web", |_| hits("https://a.org/", 0..11));
        let scraper = StaticScraper::new().failing(["https://a.org/3"]);
        let stage = ResearchStage::new(Arc::new(model(0.8)), tools(search, scraper), config(10));

        let result = stage.run("Remote work", CitationStyle::Apa).await.unwrap();
        assert_eq!(result.source_count(), 10);
        assert!(result.sources.iter().all(|s| s.id != "https://a.org/3"));
    }

    #[tokio::test]
    async fn test_pdf_candidates_are_marked() {
        let search = FnSearch::new("web", |_| {
            let mut found = hits("https://a.org/", 0..9);
            found.push(SearchHit {
                title: "Report".to_string(),
                url: "https://a.org/report.pdf".to_string(),
                snippet: String::new(),
            });
            found
        });
        let scraper = StaticScraper::new().serving_pdf(["https://a.org/2"]);
        let stage = ResearchStage::new(Arc::new(model(0.8)), tools(search, scraper), config(10));

        let result = stage.run("Remote work", CitationStyle::Apa).await.unwrap();
        assert_eq!(result.pdf_sources_count, 2);
        assert_eq!(result.web_sources_count, 8);
    }

    #[tokio::test]
    async fn test_third_pass_switches_to_next_search_tool() {
        let primary = Arc::new(FnSearch::new("serper", |_| hits("https://a.org/", 0..3)));
        let secondary = Arc::new(FnSearch::new("duckduckgo", |_| hits("https://b.org/", 0..12)));
        let search: Vec<Arc<dyn SearchTool>> = vec![primary.clone(), secondary.clone()];
        let model = Arc::new(model(0.8));
        let stage = ResearchStage::new(
            model.clone(),
            ResearchTools::new(search, Arc::new(StaticScraper::new()), Arc::new(StaticPdf::new())),
            config(10),
        );

        let result = stage.run("Remote work", CitationStyle::Apa).await.unwrap();
        assert_eq!(result.attempts, 3);
        assert_eq!(result.source_count(), 15);
        assert!(!secondary.queries().is_empty());
        assert_eq!(primary.queries().len(), 5);
        // 默认三轮内没有同义改写，不请求改写建议
        assert_eq!(model.calls_matching(QUERY_REFINEMENT_PROMPT.system_prompt), 0);
    }

    #[tokio::test]
    async fn test_missing_citation_text_falls_back_to_style_format() {
        let search = FnSearch::new("web", |_| hits("https://a.org/", 0..1));
        let stage = ResearchStage::new(
            Arc::new(model(0.8)),
            tools(search, StaticScraper::new()),
            config(1),
        );

        let result = stage.run("Remote work", CitationStyle::Apa).await.unwrap();
        assert_eq!(
            result.sources[0].citation_text,
            "Title 0. (n.d.). https://a.org/0"
        );
    }
}
