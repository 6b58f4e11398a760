use markdown::mdast::Node;
use markdown::ParseOptions;

/// 统计MDX/Markdown正文的字数
///
/// 只统计文本与行内代码节点，标题符号、链接地址、代码块和HTML/JSX标签不计入。
pub fn count_words(content: &str) -> usize {
    match markdown::to_mdast(content, &ParseOptions::gfm()) {
        Ok(root) => {
            let mut count = 0;
            walk(&root, &mut count);
            count
        }
        Err(_) => count_tokens(content),
    }
}

fn walk(node: &Node, count: &mut usize) {
    match node {
        Node::Text(text) => *count += count_tokens(&text.value),
        Node::InlineCode(code) => *count += count_tokens(&code.value),
        Node::Code(_) | Node::Html(_) | Node::Yaml(_) | Node::Toml(_) => {}
        _ => {
            if let Some(children) = node.children() {
                for child in children {
                    walk(child, count);
                }
            }
        }
    }
}

fn count_tokens(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}
