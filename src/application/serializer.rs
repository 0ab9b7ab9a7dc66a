//! Markdown serialization of captured markup trees.
//!
//! Two mutually recursive passes: a block pass emitting paragraph-separated
//! chunks and an inline pass for emphasis, links and code spans. Unknown
//! elements degrade to their serialized children, so the output is total
//! over any well-formed tree.

use crate::domain::markup::MarkupNode;

/// Tags whose children serialize in place without wrapping syntax.
const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "details", "summary", "figure",
    "figcaption",
];

/// Serialize a markup tree to Markdown: trimmed, normalized, and ending in
/// exactly one trailing newline when non-empty.
#[must_use]
pub fn serialize(root: &MarkupNode) -> String {
    let cleaned = clean_text(&serialize_blocks(root, 0));
    if cleaned.is_empty() {
        cleaned
    } else {
        format!("{cleaned}\n")
    }
}

fn serialize_blocks(parent: &MarkupNode, list_depth: usize) -> String {
    let mut out = String::new();
    for child in parent.children() {
        out.push_str(&serialize_block_node(child, list_depth));
    }
    out
}

fn serialize_block_node(node: &MarkupNode, list_depth: usize) -> String {
    let MarkupNode::Element { tag, .. } = node else {
        let text = clean_inline_text(&node.raw_text());
        return if text.is_empty() {
            text
        } else {
            format!("{text}\n\n")
        };
    };

    let tag = tag.to_ascii_lowercase();
    if let Some(level) = heading_level(&tag) {
        let content = serialize_inline_children(node);
        let content = content.trim();
        return if content.is_empty() {
            String::new()
        } else {
            format!("{} {content}\n\n", "#".repeat(level))
        };
    }

    match tag.as_str() {
        "p" => {
            let content = serialize_inline_children(node);
            let content = content.trim();
            if content.is_empty() {
                String::new()
            } else {
                format!("{content}\n\n")
            }
        }
        "pre" => serialize_pre(node),
        "blockquote" => {
            let inner = clean_text(&serialize_blocks(node, list_depth));
            if inner.is_empty() {
                return String::new();
            }
            let quoted: Vec<String> = inner
                .split('\n')
                .map(|line| {
                    if line.is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {line}")
                    }
                })
                .collect();
            format!("{}\n\n", quoted.join("\n"))
        }
        "ul" | "ol" => serialize_list(node, list_depth),
        "table" => serialize_table(node),
        "hr" => "---\n\n".to_string(),
        "br" => "\n".to_string(),
        t if CONTAINER_TAGS.contains(&t) => serialize_blocks(node, list_depth),
        _ => {
            let inline = serialize_inline_node(node);
            let inline = inline.trim();
            if inline.is_empty() {
                String::new()
            } else {
                format!("{inline}\n\n")
            }
        }
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn serialize_list(list: &MarkupNode, list_depth: usize) -> String {
    let ordered = list.is_element("ol");
    let items: Vec<&MarkupNode> = list
        .children()
        .iter()
        .filter(|child| child.is_element("li"))
        .collect();
    if items.is_empty() {
        return String::new();
    }

    let indent = "  ".repeat(list_depth);
    let continuation = "  ".repeat(list_depth + 1);
    let mut lines: Vec<String> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let marker = if ordered {
            format!("{}. ", index + 1)
        } else {
            "- ".to_string()
        };

        let (head, nested) = serialize_list_item(item, list_depth);
        let mut head_lines = head.split('\n');
        let first = head_lines.next().unwrap_or_default();
        let marker_line = format!("{indent}{marker}{first}");
        if first.is_empty() {
            lines.push(marker_line.trim_end().to_string());
        } else {
            lines.push(marker_line);
        }
        for line in head_lines {
            lines.push(format!("{continuation}{line}"));
        }
        // Nested list blocks come out of the recursion already indented.
        for block in nested {
            lines.extend(block.split('\n').map(str::to_string));
        }
    }

    format!("{}\n\n", lines.join("\n"))
}

fn serialize_list_item(item: &MarkupNode, list_depth: usize) -> (String, Vec<String>) {
    let mut inline_parts: Vec<String> = Vec::new();
    let mut nested: Vec<String> = Vec::new();

    for child in item.children() {
        if child.is_element("ul") || child.is_element("ol") {
            let block = serialize_list(child, list_depth + 1);
            let block = block.trim_end();
            if !block.is_empty() {
                nested.push(block.to_string());
            }
            continue;
        }
        let inline = serialize_inline_node(child);
        if !inline.is_empty() {
            inline_parts.push(inline);
        }
    }

    (clean_inline_text(&inline_parts.join(" ")), nested)
}

fn serialize_pre(pre: &MarkupNode) -> String {
    let code_node = pre.find_tag("code");
    let source = code_node.map_or_else(|| pre.raw_text(), MarkupNode::raw_text);
    let code = source.strip_suffix('\n').unwrap_or(&source);
    let lang = code_node.map_or_else(String::new, detect_code_lang);
    format!("```{lang}\n{code}\n```\n\n")
}

fn detect_code_lang(code: &MarkupNode) -> String {
    let Some(class) = code.attr("class") else {
        return String::new();
    };
    let lower = class.to_ascii_lowercase();
    let Some(pos) = lower.find("language-") else {
        return String::new();
    };
    class[pos + "language-".len()..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn serialize_table(table: &MarkupNode) -> String {
    let rows: Vec<&MarkupNode> = table
        .descendants()
        .skip(1)
        .filter(|n| n.is_element("tr"))
        .collect();
    if rows.is_empty() {
        return String::new();
    }

    let grid: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.descendants()
                .skip(1)
                .filter(|n| n.is_element("th") || n.is_element("td"))
                .map(|cell| {
                    let content = clean_inline_text(&serialize_inline_children(cell));
                    if content.is_empty() {
                        " ".to_string()
                    } else {
                        content
                    }
                })
                .collect()
        })
        .collect();

    let header = &grid[0];
    if header.is_empty() {
        return String::new();
    }
    let separator = vec!["---"; header.len()];

    let mut lines = Vec::with_capacity(grid.len() + 1);
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("| {} |", separator.join(" | ")));
    for cells in &grid[1..] {
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    format!("{}\n\n", lines.join("\n"))
}

fn serialize_inline_children(node: &MarkupNode) -> String {
    node.children().iter().map(serialize_inline_node).collect()
}

fn serialize_inline_node(node: &MarkupNode) -> String {
    let MarkupNode::Element { tag, .. } = node else {
        return clean_inline_text(&node.raw_text());
    };

    let tag = tag.to_ascii_lowercase();
    match tag.as_str() {
        "br" => "\n".to_string(),
        "code" => format!("`{}`", clean_inline_text(&node.raw_text())),
        "strong" | "b" => format!("**{}**", serialize_inline_children(node)),
        "em" | "i" => format!("*{}*", serialize_inline_children(node)),
        "a" => {
            let text = clean_inline_text(&serialize_inline_children(node));
            let text = if text.is_empty() { "link" } else { &text };
            match node.attr("href") {
                Some(href) if !href.is_empty() => format!("[{text}]({href})"),
                _ => text.to_string(),
            }
        }
        "img" => {
            let alt = node.attr("alt").unwrap_or_default();
            let alt = clean_inline_text(if alt.is_empty() { "image" } else { alt });
            match node.attr("src") {
                Some(src) if !src.is_empty() => format!("![{alt}]({src})"),
                _ => String::new(),
            }
        }
        "pre" => serialize_pre(node).trim().to_string(),
        _ => serialize_inline_children(node),
    }
}

/// Normalize inline whitespace: NBSP becomes a plain space, runs of spaces
/// and tabs collapse to one space, and whitespace around a newline collapses
/// into the newline. Idempotent.
#[must_use]
pub fn clean_inline_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    let mut run_has_newline = false;

    for ch in text.chars() {
        let ch = if ch == '\u{a0}' { ' ' } else { ch };
        if ch.is_whitespace() {
            in_run = true;
            if ch == '\n' {
                run_has_newline = true;
            }
        } else {
            if in_run {
                out.push(if run_has_newline { '\n' } else { ' ' });
                in_run = false;
                run_has_newline = false;
            }
            out.push(ch);
        }
    }
    if in_run {
        out.push(if run_has_newline { '\n' } else { ' ' });
    }
    out
}

/// Normalize a block of text: CRLF becomes LF, runs of three or more
/// newlines collapse to a single blank line, and the ends are trimmed.
/// Idempotent.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut newlines = 0_usize;

    for ch in normalized.chars() {
        if ch == '\n' {
            newlines += 1;
        } else {
            for _ in 0..newlines.min(2) {
                out.push('\n');
            }
            newlines = 0;
            out.push(ch);
        }
    }
    out.trim().to_string()
}
