use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::generator::context::GeneratorContext;
use crate::types::citation::CitationStyle;
use crate::types::section::SectionDocument;
use crate::types::state::ProjectRunState;

/// 保存运行结果
pub async fn save(context: &GeneratorContext, state: &ProjectRunState) -> Result<()> {
    let outlet = DiskOutlet::new(DocTree::default());
    outlet.save(context, state).await
}

pub trait Outlet {
    async fn save(&self, context: &GeneratorContext, state: &ProjectRunState) -> Result<()>;
}

/// 输出文件在输出目录下的相对路径
pub struct DocTree {
    pub run_state: String,
    pub document: String,
    pub markdown: String,
}

impl Default for DocTree {
    fn default() -> Self {
        Self {
            run_state: "run_state.json".to_string(),
            document: "thesis.json".to_string(),
            markdown: "thesis.md".to_string(),
        }
    }
}

/// 论文的结构化输出
#[derive(Debug, Serialize)]
pub struct ThesisDocument {
    pub topic: String,
    pub citation_style: CitationStyle,
    pub sections: Vec<SectionDocument>,
    pub total_word_count: usize,
    pub references: Vec<String>,
    pub warnings: Vec<String>,
}

impl ThesisDocument {
    pub fn from_state(state: &ProjectRunState) -> Self {
        Self {
            topic: state.project.topic().to_string(),
            citation_style: state.project.citation_style(),
            sections: state.documents(),
            total_word_count: state.total_word_count(),
            references: references(state),
            warnings: state.warnings.clone(),
        }
    }

    /// 拼接为单个Markdown文档
    pub fn to_markdown(&self) -> String {
        let mut text = format!("# {}\n\n", self.topic);
        for document in &self.sections {
            push_block(&mut text, &document.section.content);
            for sub in &document.section.subsections {
                push_block(&mut text, &sub.content);
            }
        }
        if !self.references.is_empty() {
            text.push_str("## References\n\n");
            let numbered = matches!(
                self.citation_style,
                CitationStyle::Ieee | CitationStyle::Vancouver
            );
            for (i, reference) in self.references.iter().enumerate() {
                if numbered {
                    text.push_str(&format!("{}. {}\n", i + 1, reference));
                } else {
                    text.push_str(&format!("- {}\n", reference));
                }
            }
        }
        text
    }
}

fn push_block(text: &mut String, block: &str) {
    let block = block.trim();
    if block.is_empty() {
        return;
    }
    text.push_str(block);
    text.push_str("\n\n");
}

/// 参考文献列表；编号格式按来源顺序，其余按字母序
fn references(state: &ProjectRunState) -> Vec<String> {
    let Some(research) = &state.research else {
        return Vec::new();
    };
    let mut entries: Vec<String> = Vec::new();
    for source in &research.sources {
        let entry = source.citation_text.trim();
        if !entry.is_empty() && !entries.iter().any(|e| e == entry) {
            entries.push(entry.to_string());
        }
    }
    if !matches!(
        state.project.citation_style(),
        CitationStyle::Ieee | CitationStyle::Vancouver
    ) {
        entries.sort_by_key(|e| e.to_lowercase());
    }
    entries
}

pub struct DiskOutlet {
    doc_tree: DocTree,
}

impl DiskOutlet {
    pub fn new(doc_tree: DocTree) -> Self {
        Self { doc_tree }
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, context: &GeneratorContext, state: &ProjectRunState) -> Result<()> {
        info!("🖊️ 结果存储中...");
        let output_dir = &context.config.output_path;
        fs::create_dir_all(output_dir)?;

        write_file(
            output_dir,
            &self.doc_tree.run_state,
            &serde_json::to_string_pretty(state)?,
        )?;

        if state.sections.is_empty() {
            warn!("⚠️ 没有已写成的章节，只保存运行状态");
            return Ok(());
        }

        let document = ThesisDocument::from_state(state);
        write_file(
            output_dir,
            &self.doc_tree.document,
            &serde_json::to_string_pretty(&document)?,
        )?;
        write_file(output_dir, &self.doc_tree.markdown, &document.to_markdown())?;

        info!("💾 结果保存完成，输出目录: {}", output_dir.display());
        Ok(())
    }
}

fn write_file(dir: &Path, relative_path: &str, content: &str) -> Result<()> {
    let path = dir.join(relative_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    info!("💾 已保存: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::ScriptedModel;
    use crate::types::outline::SectionType;
    use crate::types::project::ProjectInfo;
    use crate::types::section::WrittenSection;
    use crate::types::source::{ResearchResult, Source, SourceType};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &Path) -> GeneratorContext {
        let config = Config {
            output_path: dir.join("out"),
            ..Default::default()
        };
        GeneratorContext::with_model(config, Arc::new(ScriptedModel::new()))
    }

    fn source(id: &str, citation: &str) -> Source {
        Source {
            id: id.to_string(),
            title: id.to_string(),
            url: Some(id.to_string()),
            doi: None,
            source_type: SourceType::Website,
            authors: vec![],
            publication_year: None,
            abstract_text: None,
            key_findings: None,
            summary: String::new(),
            full_content: String::new(),
            relevance_score: 0.9,
            relevance_reason: String::new(),
            citation_text: citation.to_string(),
            is_pdf: false,
        }
    }

    fn section(title: &str, content: &str, words: usize) -> WrittenSection {
        WrittenSection {
            title: title.to_string(),
            section_type: SectionType::Body,
            parent: None,
            content: content.to_string(),
            target_word_count: 10,
            word_count: words,
            under_target: false,
            attempts: 1,
            notes: vec![],
            children: vec![],
        }
    }

    fn state(style: CitationStyle) -> ProjectRunState {
        let info = ProjectInfo::new("Remote work", style).unwrap();
        let mut state = ProjectRunState::new(1, info);
        state.research = Some(ResearchResult::new(
            vec![
                source("https://b.org", "Zeta, A. (2020). Remote teams."),
                source("https://a.org", "Alpha, B. (2021). Focus at home."),
            ],
            "Summary".to_string(),
            String::new(),
            String::new(),
            1,
            vec![],
        ));
        state
            .sections
            .push(section("Introduction", "## Introduction\n\nWork moved home.", 4));
        state
    }

    #[tokio::test]
    async fn test_disk_outlet_writes_all_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(temp_dir.path());

        save(&context, &state(CitationStyle::Apa)).await.unwrap();

        let out = temp_dir.path().join("out");
        assert!(out.join("run_state.json").exists());
        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("thesis.json")).unwrap()).unwrap();
        assert_eq!(document["topic"], "Remote work");
        assert_eq!(document["total_word_count"], 4);
        assert_eq!(
            document["sections"][0]["section"]["section_title"],
            "Introduction"
        );

        let markdown = fs::read_to_string(out.join("thesis.md")).unwrap();
        assert!(markdown.starts_with("# Remote work\n\n## Introduction"));
        let alpha = markdown.find("- Alpha").unwrap();
        let zeta = markdown.find("- Zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_numbered_styles_keep_source_order() {
        let document = ThesisDocument::from_state(&state(CitationStyle::Ieee));
        assert!(document.references[0].starts_with("Zeta"));
        assert!(document.to_markdown().contains("1. Zeta"));
    }

    #[tokio::test]
    async fn test_run_without_sections_saves_state_only() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(temp_dir.path());
        let info = ProjectInfo::new("Remote work", CitationStyle::Apa).unwrap();

        save(&context, &ProjectRunState::new(2, info)).await.unwrap();

        let out = temp_dir.path().join("out");
        assert!(out.join("run_state.json").exists());
        assert!(!out.join("thesis.md").exists());
    }
}
