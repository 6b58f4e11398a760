//! 草稿到大纲的构建与结构校验

use std::collections::HashSet;

use super::types::{DraftNode, OutlineDraft};
use crate::types::outline::{Outline, OutlineNode, OutlineViolation, SectionType};

/// 把草稿整理为两层大纲
///
/// 子节点的parent_section为空时归属到所在的顶层节；非空时必须指向已存在的顶层标题，
/// 指向子节标题视为超出两层。顶层节本身带parent_section时同样按子节处理。
pub fn build_outline(draft: &OutlineDraft) -> Result<Outline, OutlineViolation> {
    let mut sections: Vec<OutlineNode> = Vec::new();
    let mut pending: Vec<(&DraftNode, Option<&str>)> = Vec::new();

    for entry in &draft.structure {
        let parent = entry.section.parent_section.trim();
        if parent.is_empty() {
            sections.push(to_node(&entry.section, None, None)?);
        } else {
            pending.push((&entry.section, None));
        }
        for sub in &entry.subsections {
            pending.push((sub, Some(entry.section.title.trim())));
        }
    }
    if sections.is_empty() {
        return Err(OutlineViolation::Empty);
    }

    let mut top_titles = HashSet::new();
    for section in &sections {
        if !top_titles.insert(section.title.clone()) {
            return Err(OutlineViolation::DuplicateTitle(section.title.clone()));
        }
    }
    let sub_titles: HashSet<&str> = pending
        .iter()
        .map(|&(node, _)| node.title.trim())
        .collect();

    for (node, enclosing) in pending {
        let declared = node.parent_section.trim();
        let parent = if declared.is_empty() {
            enclosing.unwrap_or_default()
        } else {
            declared
        };

        let Some(target) = sections.iter_mut().find(|s| s.title == parent) else {
            let title = node.title.trim().to_string();
            if sub_titles.contains(parent) {
                return Err(OutlineViolation::DepthExceeded { title });
            }
            return Err(OutlineViolation::UnknownParent {
                title,
                parent: parent.to_string(),
            });
        };
        let child = to_node(node, Some(parent), Some(SectionType::Subsection))?;
        target.children.push(child);
    }

    sections.sort_by_key(|s| s.order);
    for section in &mut sections {
        section.children.sort_by_key(|c| c.order);
    }

    let outline = Outline { sections };
    outline.validate()?;
    Ok(outline)
}

fn to_node(
    node: &DraftNode,
    parent: Option<&str>,
    fallback_type: Option<SectionType>,
) -> Result<OutlineNode, OutlineViolation> {
    let title = node.title.trim();
    if title.is_empty() {
        return Err(OutlineViolation::EmptyTitle);
    }
    if node.word_count <= 0 {
        return Err(OutlineViolation::NonPositiveTarget {
            title: title.to_string(),
            target: node.word_count,
        });
    }

    let mut section_type = SectionType::parse_lenient(&node.section_type);
    if section_type == SectionType::Body
        && let Some(fallback) = fallback_type
    {
        section_type = fallback;
    }

    Ok(OutlineNode {
        title: title.to_string(),
        section_type,
        target_word_count: node.word_count.min(u32::MAX as i64) as u32,
        order: node.order.max(0) as u32,
        parent: parent.map(str::to_string),
        children: Vec::new(),
    })
}
