//! Markup tree model for captured page content.
//!
//! Pages are captured as a tree of text and element nodes (the JSON shape
//! produced by the capture side). The tree is read-only: the serializer and
//! the page agent walk it, nothing mutates it.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Element tags that break visible text onto their own line.
const TEXT_BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "details", "summary", "figure",
    "figcaption", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "table", "pre",
    "blockquote", "hr",
];

/// One node of a captured markup tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarkupNode {
    /// A text node.
    Text { content: String },
    /// An element node with its attributes and children in document order.
    Element {
        tag: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<MarkupNode>,
    },
}

impl MarkupNode {
    /// Element tag name, `None` for text nodes.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Element { tag, .. } => Some(tag.as_str()),
        }
    }

    /// Whether this node is an element with the given tag (ASCII case-insensitive).
    #[must_use]
    pub fn is_element(&self, name: &str) -> bool {
        self.tag().is_some_and(|t| t.eq_ignore_ascii_case(name))
    }

    /// Attribute value, `None` for text nodes or missing attributes.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Element { attributes, .. } => attributes.get(name).map(String::as_str),
        }
    }

    /// Whether the `class` attribute contains the given class name.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|part| part == class))
    }

    /// Child nodes in document order; empty for text nodes.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Text { .. } => &[],
            Self::Element { children, .. } => children,
        }
    }

    /// Pre-order walk over this node and everything below it.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// First descendant below this node carrying the given tag.
    #[must_use]
    pub fn find_tag(&self, name: &str) -> Option<&Self> {
        self.descendants().skip(1).find(|n| n.is_element(name))
    }

    /// Raw concatenation of every text node below, no separators.
    #[must_use]
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        for node in self.descendants() {
            if let Self::Text { content } = node {
                out.push_str(content);
            }
        }
        out
    }

    /// Visible-text approximation: text nodes concatenated, with block-level
    /// elements and `br` breaking lines.
    #[must_use]
    pub fn flatten_text(&self) -> String {
        let mut out = String::new();
        self.collect_visible(&mut out);
        out
    }

    fn collect_visible(&self, out: &mut String) {
        match self {
            Self::Text { content } => out.push_str(content),
            Self::Element { tag, children, .. } => {
                if tag.eq_ignore_ascii_case("br") {
                    out.push('\n');
                    return;
                }
                let block = TEXT_BLOCK_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t));
                if block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                for child in children {
                    child.collect_visible(out);
                }
                if block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
}

/// Pre-order iterator over a markup subtree, root included.
pub struct Descendants<'a> {
    stack: Vec<&'a MarkupNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a MarkupNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let MarkupNode::Element { children, .. } = node {
            self.stack.extend(children.iter().rev());
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str, children: Vec<MarkupNode>) -> MarkupNode {
        MarkupNode::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            children,
        }
    }

    fn txt(content: &str) -> MarkupNode {
        MarkupNode::Text {
            content: content.to_string(),
        }
    }

    #[test]
    fn deserializes_minimal_wire_shape() {
        let node: MarkupNode =
            serde_json::from_str(r#"{"kind":"element","tag":"p","children":[{"kind":"text","content":"hi"}]}"#)
                .unwrap();
        assert!(node.is_element("p"));
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.raw_text(), "hi");
    }

    #[test]
    fn class_matching_splits_on_whitespace() {
        let node: MarkupNode = serde_json::from_str(
            r#"{"kind":"element","tag":"div","attributes":{"class":"markdown prose w-full"}}"#,
        )
        .unwrap();
        assert!(node.has_class("markdown"));
        assert!(node.has_class("prose"));
        assert!(!node.has_class("mark"));
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let tree = el(
            "div",
            vec![el("p", vec![txt("a")]), el("span", vec![txt("b")])],
        );
        let tags: Vec<_> = tree.descendants().filter_map(MarkupNode::tag).collect();
        assert_eq!(tags, vec!["div", "p", "span"]);
        assert_eq!(tree.raw_text(), "ab");
    }

    #[test]
    fn find_tag_skips_the_root_itself() {
        let tree = el("pre", vec![el("code", vec![txt("x")])]);
        assert!(tree.find_tag("code").is_some());
        assert!(tree.find_tag("pre").is_none());
    }

    #[test]
    fn flatten_text_breaks_lines_at_blocks_and_br() {
        let tree = el(
            "div",
            vec![
                el("p", vec![txt("first")]),
                el("p", vec![txt("second"), el("br", vec![]), txt("third")]),
            ],
        );
        assert_eq!(tree.flatten_text(), "first\nsecond\nthird\n");
    }
}
