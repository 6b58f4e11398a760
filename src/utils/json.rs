use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;

/// 从模型回复中解析JSON
///
/// 兼容```json代码块包裹以及JSON前后夹杂说明文字的情况。
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T> {
    let candidate = extract_json_block(response)
        .ok_or_else(|| anyhow!("模型回复中未找到JSON内容: {}", preview(response)))?;
    serde_json::from_str(candidate)
        .with_context(|| format!("模型回复的JSON无法解析: {}", preview(candidate)))
}

/// 截取回复中第一个完整的JSON对象或数组
///
/// 按括号配对扫描，字符串内的括号与转义字符不参与计数，
/// 因此JSON之后的说明文字即使含有括号也不会被截入。
pub fn extract_json_block(response: &str) -> Option<&str> {
    let text = strip_code_fence(response.trim());
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 去掉包裹整段回复的代码块标记
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn preview(text: &str) -> String {
    crate::utils::text::truncate_chars(text, 200)
}
