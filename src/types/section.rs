use serde::{Deserialize, Serialize};

use crate::types::outline::SectionType;

/// 已写成的章节，子节点为其小节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenSection {
    pub title: String,
    pub section_type: SectionType,
    pub parent: Option<String>,
    /// MDX格式正文
    pub content: String,
    pub target_word_count: u32,
    pub word_count: usize,
    /// 重试耗尽后仍低于目标字数
    pub under_target: bool,
    pub attempts: u32,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub children: Vec<WrittenSection>,
}

/// 字数相对目标的区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCountBand {
    UnderTarget,
    WithinBand,
    AboveCeiling,
}

impl WordCountBand {
    pub fn classify(word_count: usize, target: u32, ceiling_ratio: f64) -> Self {
        let target = target as f64;
        let count = word_count as f64;
        if count < target {
            WordCountBand::UnderTarget
        } else if count > target * ceiling_ratio {
            WordCountBand::AboveCeiling
        } else {
            WordCountBand::WithinBand
        }
    }
}

impl WrittenSection {
    /// 本节与所有小节的字数之和
    pub fn total_word_count(&self) -> usize {
        self.word_count + self.children.iter().map(|c| c.word_count).sum::<usize>()
    }

    /// 深度优先遍历本节及其小节
    pub fn iter_depth_first(&self) -> impl Iterator<Item = &WrittenSection> {
        std::iter::once(self).chain(self.children.iter())
    }

    /// 是否存在低于目标的节点
    pub fn has_shortfall(&self) -> bool {
        self.iter_depth_first().any(|s| s.under_target)
    }

    /// 供后续章节保持连贯的摘要
    pub fn digest(&self, max_chars: usize) -> String {
        let flattened = self
            .content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect::<Vec<_>>()
            .join(" ");
        let digest = crate::utils::text::truncate_chars(&flattened, max_chars);
        format!("### {}\n{}", self.title, digest)
    }
}

/// 对外输出的章节内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    pub section_title: String,
    pub section_type: SectionType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_section: Option<String>,
    pub content: String,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subsections: Vec<SectionContent>,
}

/// 单个顶层章节的输出文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDocument {
    pub section: SectionContent,
    pub total_word_count: usize,
    pub writing_notes: String,
}

impl From<&WrittenSection> for SectionContent {
    fn from(section: &WrittenSection) -> Self {
        Self {
            section_title: section.title.clone(),
            section_type: section.section_type,
            parent_section: section.parent.clone(),
            content: section.content.clone(),
            word_count: section.word_count,
            subsections: section.children.iter().map(SectionContent::from).collect(),
        }
    }
}

impl From<&WrittenSection> for SectionDocument {
    fn from(section: &WrittenSection) -> Self {
        let writing_notes = section
            .iter_depth_first()
            .flat_map(|s| s.notes.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            section: SectionContent::from(section),
            total_word_count: section.total_word_count(),
            writing_notes,
        }
    }
}
