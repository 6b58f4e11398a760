use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 章节类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Abstract,
    Introduction,
    LiteratureReview,
    Methodology,
    Results,
    Discussion,
    Conclusion,
    References,
    Subsection,
    #[default]
    #[serde(other)]
    Body,
}

impl SectionType {
    /// 宽松解析模型给出的章节类型
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "abstract" | "summary" => SectionType::Abstract,
            "introduction" | "intro" => SectionType::Introduction,
            "literature_review" | "literature" | "related_work" | "background" => {
                SectionType::LiteratureReview
            }
            "methodology" | "methods" | "method" => SectionType::Methodology,
            "results" | "findings" => SectionType::Results,
            "discussion" => SectionType::Discussion,
            "conclusion" | "conclusions" => SectionType::Conclusion,
            "references" | "bibliography" => SectionType::References,
            "subsection" | "sub_section" => SectionType::Subsection,
            _ => SectionType::Body,
        }
    }
}

impl std::fmt::Display for SectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SectionType::Abstract => "abstract",
            SectionType::Introduction => "introduction",
            SectionType::LiteratureReview => "literature_review",
            SectionType::Methodology => "methodology",
            SectionType::Results => "results",
            SectionType::Discussion => "discussion",
            SectionType::Conclusion => "conclusion",
            SectionType::References => "references",
            SectionType::Subsection => "subsection",
            SectionType::Body => "body",
        };
        write!(f, "{}", name)
    }
}

/// 大纲节点，最多两层
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    pub section_type: SectionType,
    pub target_word_count: u32,
    pub order: u32,
    /// 顶层节点为None，子节点为所属顶层节点的标题
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// 节点自身与子节点的目标字数之和
    pub fn subtree_target_words(&self) -> u64 {
        self.target_word_count as u64
            + self
                .children
                .iter()
                .map(|c| c.target_word_count as u64)
                .sum::<u64>()
    }
}

/// 大纲结构不合法的原因
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutlineViolation {
    #[error("outline has no sections")]
    Empty,

    #[error("a section has an empty title")]
    EmptyTitle,

    #[error("duplicate top-level section title '{0}'")]
    DuplicateTitle(String),

    #[error("section '{title}' references unknown parent '{parent}'")]
    UnknownParent { title: String, parent: String },

    #[error("section '{title}' is nested deeper than two levels")]
    DepthExceeded { title: String },

    #[error("section '{title}' has a non-positive target word count ({target})")]
    NonPositiveTarget { title: String, target: i64 },
}

/// 已通过校验的大纲
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub sections: Vec<OutlineNode>,
}

impl Outline {
    /// 校验已构建大纲的结构不变量
    pub fn validate(&self) -> Result<(), OutlineViolation> {
        if self.sections.is_empty() {
            return Err(OutlineViolation::Empty);
        }

        let mut top_titles = HashSet::new();
        for section in &self.sections {
            check_node(section)?;
            if let Some(parent) = &section.parent {
                return Err(OutlineViolation::UnknownParent {
                    title: section.title.clone(),
                    parent: parent.clone(),
                });
            }
            if !top_titles.insert(section.title.as_str()) {
                return Err(OutlineViolation::DuplicateTitle(section.title.clone()));
            }
        }

        for section in &self.sections {
            for child in &section.children {
                check_node(child)?;
                if child.parent.as_deref() != Some(section.title.as_str()) {
                    return Err(OutlineViolation::UnknownParent {
                        title: child.title.clone(),
                        parent: child.parent.clone().unwrap_or_default(),
                    });
                }
                if !child.children.is_empty() {
                    return Err(OutlineViolation::DepthExceeded {
                        title: child.children[0].title.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 所有节点的目标字数之和
    pub fn total_target_words(&self) -> u64 {
        self.sections.iter().map(|s| s.subtree_target_words()).sum()
    }

    pub fn node_count(&self) -> usize {
        self.sections.iter().map(|s| 1 + s.children.len()).sum()
    }

    /// 深度优先遍历：父节点在前，子节点在后
    pub fn iter_depth_first(&self) -> impl Iterator<Item = &OutlineNode> {
        self.sections
            .iter()
            .flat_map(|s| std::iter::once(s).chain(s.children.iter()))
    }

    /// 总字数偏离目标超过容差时按比例调整各节点目标
    ///
    /// 返回是否发生了调整。每个节点至少保留1个字的目标。
    pub fn rebalance_targets(&mut self, document_target: u32, tolerance: f64) -> bool {
        let total = self.total_target_words();
        if total == 0 || document_target == 0 {
            return false;
        }
        let deviation = (total as f64 - document_target as f64).abs() / document_target as f64;
        if deviation <= tolerance {
            return false;
        }

        let factor = document_target as f64 / total as f64;
        for section in &mut self.sections {
            section.target_word_count = scale_target(section.target_word_count, factor);
            for child in &mut section.children {
                child.target_word_count = scale_target(child.target_word_count, factor);
            }
        }
        true
    }

    /// 以缩进列表的形式描述大纲，用于提示词
    pub fn describe(&self) -> String {
        let mut text = String::new();
        for section in &self.sections {
            text.push_str(&format!(
                "- {} [{}] ({} words)\n",
                section.title, section.section_type, section.target_word_count
            ));
            for child in &section.children {
                text.push_str(&format!(
                    "  - {} ({} words)\n",
                    child.title, child.target_word_count
                ));
            }
        }
        text
    }
}

fn check_node(node: &OutlineNode) -> Result<(), OutlineViolation> {
    if node.title.trim().is_empty() {
        return Err(OutlineViolation::EmptyTitle);
    }
    if node.target_word_count == 0 {
        return Err(OutlineViolation::NonPositiveTarget {
            title: node.title.clone(),
            target: 0,
        });
    }
    Ok(())
}

fn scale_target(target: u32, factor: f64) -> u32 {
    ((target as f64 * factor).round() as u32).max(1)
}
