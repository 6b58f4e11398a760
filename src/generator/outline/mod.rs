//! 大纲阶段：根据调研结果生成两层大纲并校验结构

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::OutlineConfig;
use crate::error::PipelineError;
use crate::generator::agent_executor::{PromptMaterial, PromptTemplate, extract};
use crate::llm::LanguageModel;
use crate::types::citation::CitationStyle;
use crate::types::outline::{Outline, OutlineViolation};
use crate::types::source::ResearchResult;

pub mod types;
pub mod validator;

use types::OutlineDraft;
use validator::build_outline;

pub const OUTLINE_PROMPT: PromptTemplate = PromptTemplate {
    system_prompt: "You are a PhD-level academic structure specialist. You design well-structured thesis outlines that follow academic conventions and a logical argument flow.",
    opening_instruction: "Create a comprehensive thesis outline from the research material below.",
    closing_instruction: "Include the standard thesis sections (Abstract, Introduction, Literature Review, Methodology, Results, Discussion, Conclusion) and break each into subsections where useful. Give every section and subsection a positive word_count and an order. For top-level sections set parent_section to an empty string. For subsections set parent_section to the exact title of their top-level section. Do not nest subsections inside subsections.",
};

/// 大纲阶段
pub struct OutliningStage {
    llm: Arc<dyn LanguageModel>,
    config: OutlineConfig,
}

impl OutliningStage {
    pub fn new(llm: Arc<dyn LanguageModel>, config: OutlineConfig) -> Self {
        Self { llm, config }
    }

    /// 生成并校验大纲，结构不合法时带着问题描述重新生成
    pub async fn run(
        &self,
        research: &ResearchResult,
        topic: &str,
        citation_style: CitationStyle,
    ) -> Result<Outline, PipelineError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_violation: Option<OutlineViolation> = None;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            info!("📑 生成大纲 (第 {} / {} 次)", attempt, max_attempts);
            let params = OUTLINE_PROMPT.params(
                &self.materials(research, topic, citation_style, last_violation.as_ref()),
                "大纲生成",
            );

            let draft: OutlineDraft = match extract(self.llm.as_ref(), &params).await {
                Ok(draft) => draft,
                Err(e) => {
                    warn!("⚠️ 大纲生成失败: {}", e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match build_outline(&draft) {
                Ok(mut outline) => {
                    if outline.rebalance_targets(
                        self.config.target_document_words,
                        self.config.balance_tolerance,
                    ) {
                        info!(
                            "⚖️ 已按全文目标 {} 字重新分配各节字数",
                            self.config.target_document_words
                        );
                    }
                    info!(
                        "✅ 大纲通过校验：{} 个顶层章节，共 {} 个节点，目标 {} 字",
                        outline.sections.len(),
                        outline.node_count(),
                        outline.total_target_words()
                    );
                    return Ok(outline);
                }
                Err(violation) => {
                    warn!("⚠️ 大纲结构不合法: {}", violation);
                    last_violation = Some(violation);
                }
            }
        }

        match (last_violation, last_error) {
            (Some(violation), _) => Err(PipelineError::InvalidOutline {
                attempts: max_attempts,
                violation,
            }),
            (None, error) => Err(PipelineError::generation(
                "outline",
                error.unwrap_or_else(|| "no outline generated".to_string()),
            )),
        }
    }

    fn materials(
        &self,
        research: &ResearchResult,
        topic: &str,
        citation_style: CitationStyle,
        violation: Option<&OutlineViolation>,
    ) -> Vec<PromptMaterial> {
        let sources = research
            .top_sources(10)
            .iter()
            .map(|s| format!("- {}: {}", s.title, s.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let mut materials = vec![
            PromptMaterial::new("Topic", topic),
            PromptMaterial::new("Citation style", citation_style.display_name()),
            PromptMaterial::new(
                "Document length",
                format!(
                    "The word counts of all sections and subsections should add up to about {} words.",
                    self.config.target_document_words
                ),
            ),
            PromptMaterial::new("Research summary", research.research_summary.as_str()),
            PromptMaterial::new("Research gaps", research.research_gaps.as_str()),
            PromptMaterial::new("Key sources", sources),
        ];
        if let Some(violation) = violation {
            materials.push(PromptMaterial::new(
                "Problem with the previous outline",
                format!("{}. Fix this problem in the new outline.", violation),
            ));
        }
        materials
    }
}
