//! 写作阶段：按大纲深度优先逐节写作，并保证字数达到目标

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WritingConfig;
use crate::error::PipelineError;
use crate::generator::agent_executor::{PromptMaterial, PromptTemplate, prompt};
use crate::llm::LanguageModel;
use crate::types::citation::CitationStyle;
use crate::types::outline::{Outline, OutlineNode};
use crate::types::section::{WordCountBand, WrittenSection};
use crate::types::source::ResearchResult;
use crate::utils::json::strip_code_fence;
use crate::utils::word_count::count_words;

pub const SECTION_WRITING_PROMPT: PromptTemplate = PromptTemplate {
    system_prompt: "You are an expert academic writer. You write one thesis section at a time in formal academic English, formatted as MDX, citing the provided sources in the requested citation style and staying consistent with the sections written before.",
    opening_instruction: "Write the thesis section described below.",
    closing_instruction: "Return only the section content in MDX, starting with the section heading. Cite sources in-text using the requested citation style. Do not write the content of other sections or subsections.",
};

/// 一次写作所需的上下文
pub struct WritingRequest<'a> {
    pub topic: &'a str,
    pub citation_style: CitationStyle,
    pub research: &'a ResearchResult,
    pub outline: &'a Outline,
}

/// 写作阶段
pub struct WritingStage {
    llm: Arc<dyn LanguageModel>,
    config: WritingConfig,
}

impl WritingStage {
    pub fn new(llm: Arc<dyn LanguageModel>, config: WritingConfig) -> Self {
        Self { llm, config }
    }

    /// 依次写完所有顶层章节
    pub async fn run(&self, request: &WritingRequest<'_>) -> Result<Vec<WrittenSection>, PipelineError> {
        let mut written: Vec<WrittenSection> = Vec::new();
        for node in &request.outline.sections {
            let section = self.write_top_level(request, node, &written).await?;
            written.push(section);
        }
        Ok(written)
    }

    /// 写一个顶层章节：先写章节本身，再按顺序写其小节
    pub async fn write_top_level(
        &self,
        request: &WritingRequest<'_>,
        node: &OutlineNode,
        previous: &[WrittenSection],
    ) -> Result<WrittenSection, PipelineError> {
        let mut digests: Vec<String> = previous
            .iter()
            .flat_map(|s| s.iter_depth_first())
            .map(|s| s.digest(self.config.digest_chars))
            .collect();

        info!("✍️ 写作章节: {}", node.title);
        let mut section = self.write_node(request, node, &digests).await?;
        digests.push(section.digest(self.config.digest_chars));

        for child in &node.children {
            info!("✍️ 写作小节: {} / {}", node.title, child.title);
            let written = self.write_node(request, child, &digests).await?;
            digests.push(written.digest(self.config.digest_chars));
            section.children.push(written);
        }

        for warning in shortfall_warnings(&section) {
            warn!("⚠️ {}", warning);
        }
        Ok(section)
    }

    /// 写单个节点，字数不足时要求扩写，重试耗尽后保留最长的一稿并标记
    async fn write_node(
        &self,
        request: &WritingRequest<'_>,
        node: &OutlineNode,
        digests: &[String],
    ) -> Result<WrittenSection, PipelineError> {
        let max_attempts = self.config.max_attempts.max(1);
        let target = node.target_word_count;
        let mut best: Option<(String, usize)> = None;
        let mut last_error: Option<String> = None;
        let mut notes: Vec<String> = Vec::new();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            let shortfall = best.as_ref().map(|(_, wc)| *wc);
            let params = SECTION_WRITING_PROMPT.params(
                &self.materials(request, node, digests, shortfall),
                format!("写作 {}", node.title),
            );

            let content = match prompt(self.llm.as_ref(), &params).await {
                Ok(text) => strip_code_fence(&text).trim().to_string(),
                Err(e) => {
                    warn!("⚠️ 章节 {} 生成失败 (第 {} / {} 次): {}", node.title, attempt, max_attempts, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            let word_count = count_words(&content);

            match WordCountBand::classify(word_count, target, self.config.ceiling_ratio) {
                WordCountBand::UnderTarget => {
                    warn!(
                        "⚠️ 章节 {} 字数不足：{} / {} (第 {} / {} 次)",
                        node.title, word_count, target, attempt, max_attempts
                    );
                    notes.push(format!(
                        "Attempt {}: {} of {} words, expansion requested.",
                        attempt, word_count, target
                    ));
                    if best.as_ref().is_none_or(|(_, wc)| word_count > *wc) {
                        best = Some((content, word_count));
                    }
                }
                band => {
                    if band == WordCountBand::AboveCeiling {
                        info!("章节 {} 超出建议字数上限：{} / {}", node.title, word_count, target);
                    }
                    return Ok(written(node, content, word_count, false, attempt, notes));
                }
            }
        }

        match best {
            Some((content, word_count)) => {
                let warning = PipelineError::WritingIncomplete {
                    title: node.title.clone(),
                    target,
                    actual: word_count,
                };
                notes.push(format!("Accepted below target: {}.", warning));
                Ok(written(node, content, word_count, true, attempts, notes))
            }
            None => Err(PipelineError::generation(
                "writing",
                format!(
                    "section '{}': {}",
                    node.title,
                    last_error.unwrap_or_else(|| "no content generated".to_string())
                ),
            )),
        }
    }

    fn materials(
        &self,
        request: &WritingRequest<'_>,
        node: &OutlineNode,
        digests: &[String],
        shortfall: Option<usize>,
    ) -> Vec<PromptMaterial> {
        let sources = request
            .research
            .top_sources(self.config.max_sources_in_prompt)
            .iter()
            .map(|s| format!("- {}\n  {}", s.citation_text, s.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let ceiling = (node.target_word_count as f64 * self.config.ceiling_ratio).round() as u64;

        let mut assignment = format!("Section title: {}\n", node.title);
        assignment.push_str(&format!("Section type: {}\n", node.section_type));
        if let Some(parent) = &node.parent {
            assignment.push_str(&format!("Parent section: {}\n", parent));
        }
        if !node.children.is_empty() {
            let children: Vec<&str> = node.children.iter().map(|c| c.title.as_str()).collect();
            assignment.push_str(&format!(
                "Its subsections ({}) are written separately; introduce them without covering them.\n",
                children.join(", ")
            ));
        }
        assignment.push_str(&format!(
            "Length: at least {} words, ideally no more than {} words.",
            node.target_word_count, ceiling
        ));

        let mut materials = vec![
            PromptMaterial::new("Topic", request.topic),
            PromptMaterial::new(
                "Citation style",
                format!(
                    "{}. {}",
                    request.citation_style.display_name(),
                    request.citation_style.prompt_instruction()
                ),
            ),
            PromptMaterial::new("Research summary", request.research.research_summary.as_str()),
            PromptMaterial::new("Thesis outline", request.outline.describe()),
            PromptMaterial::new("Sources", sources),
            PromptMaterial::new("Previously written sections", digests.join("\n\n")),
            PromptMaterial::new("Section to write", assignment),
        ];
        if let Some(previous) = shortfall {
            materials.push(PromptMaterial::new(
                "Expansion required",
                format!(
                    "The previous draft had only {} words, below the {}-word minimum. Expand the section with deeper analysis, more evidence from the sources and additional examples.",
                    previous, node.target_word_count
                ),
            ));
        }
        materials
    }
}

fn written(
    node: &OutlineNode,
    content: String,
    word_count: usize,
    under_target: bool,
    attempts: u32,
    notes: Vec<String>,
) -> WrittenSection {
    WrittenSection {
        title: node.title.clone(),
        section_type: node.section_type,
        parent: node.parent.clone(),
        content,
        target_word_count: node.target_word_count,
        word_count,
        under_target,
        attempts,
        notes,
        children: Vec::new(),
    }
}

/// 章节及其小节中低于目标字数的节点
pub fn shortfall_warnings(section: &WrittenSection) -> Vec<PipelineError> {
    section
        .iter_depth_first()
        .filter(|s| s.under_target)
        .map(|s| PipelineError::WritingIncomplete {
            title: s.title.clone(),
            target: s.target_word_count,
            actual: s.word_count,
        })
        .collect()
}
