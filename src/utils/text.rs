use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid whitespace regex"));

static BOILERPLATE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(click here|read more|learn more|view all)\b").expect("valid boilerplate regex")
});

/// 不参与正文提取的标签
const SKIPPED_TAGS: [&str; 7] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript",
];

/// 块级标签结束后换行
const BLOCK_TAGS: [&str; 14] = [
    "p", "br", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "blockquote",
];

/// 简单的HTML转纯文本
///
/// 跳过脚本、样式和导航类区块，块级元素转换为换行，并解码常见实体。
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut tag_name = String::new();
    let mut building_tag = false;
    let mut skip_depth = 0usize;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' && in_tag {
            in_tag = false;
            building_tag = false;

            let tag_lower = tag_name.to_lowercase();
            let (closing, name) = match tag_lower.strip_prefix('/') {
                Some(name) => (true, name),
                None => (false, tag_lower.as_str()),
            };
            if SKIPPED_TAGS.contains(&name) {
                if closing {
                    skip_depth = skip_depth.saturating_sub(1);
                } else {
                    skip_depth += 1;
                }
            } else if BLOCK_TAGS.contains(&name) {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || (ch == '/' && tag_name.is_empty())) {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if skip_depth > 0 {
            continue;
        }
        text.push(ch);
    }

    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// 清理抓取到的正文
///
/// 丢弃过短的行、纯数字行、裸链接以及导航类套话，然后折叠空白。
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 15)
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()))
        .filter(|line| {
            let lower = line.to_lowercase();
            !(lower.starts_with("http") || lower.starts_with("www"))
        })
        .map(|line| BOILERPLATE_PHRASE.replace_all(line, "").to_string())
        .map(|line| WHITESPACE_RUN.replace_all(line.trim(), " ").to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 超长正文的截断
///
/// 优先在句末或换行处截断，只要截断点保留了80%以上的额度；截断后附带说明。
pub fn truncate_intelligently(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let head = truncate_chars(text, max_chars);
    let min_keep = max_chars * 4 / 5;
    let cut = head
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| head[..end].chars().count() > min_keep)
        .last()
        .unwrap_or(head.len());

    let kept = &head[..cut];
    format!(
        "{}\n\n[Content truncated from {} to {} characters]",
        kept.trim_end(),
        total,
        kept.chars().count()
    )
}

/// 按字符数截断，不会切断多字节字符
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
