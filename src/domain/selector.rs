//! Minimal CSS-style selectors over [`MarkupNode`] trees.
//!
//! Supports the subset the page queries need: tag names, `#id`, `.class`,
//! attribute tests (`[a]`, `[a=v]`, `[a^=v]`, `[a*=v]`) and the descendant
//! combinator. Selector strings come from configuration, so queries stay
//! ordered fallback lists instead of hard-coded constants.

use std::str::FromStr;

use crate::domain::error::{ArchiveError, Result};
use crate::domain::markup::MarkupNode;

/// A parsed selector: one or more compound parts joined by descendant
/// combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    parts: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Present,
    Equals(String),
    StartsWith(String),
    Contains(String),
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts = split_compounds(s)
            .into_iter()
            .map(parse_compound)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if parts.is_empty() {
            return Err("empty selector".to_string());
        }
        Ok(Self { parts })
    }
}

impl Selector {
    /// All descendants of `root` matching this selector, in document order.
    /// The root itself is not a candidate; ancestor steps are resolved
    /// within the queried subtree.
    #[must_use]
    pub fn query_all<'a>(&self, root: &'a MarkupNode) -> Vec<&'a MarkupNode> {
        let mut hits = Vec::new();
        let mut ancestors = Vec::new();
        for child in root.children() {
            self.query_into(child, &mut ancestors, &mut hits);
        }
        hits
    }

    /// First match below `root`, if any.
    #[must_use]
    pub fn find_first<'a>(&self, root: &'a MarkupNode) -> Option<&'a MarkupNode> {
        self.query_all(root).into_iter().next()
    }

    /// Test a single node with no ancestor context. Selectors with
    /// descendant steps never match here.
    #[must_use]
    pub fn matches(&self, node: &MarkupNode) -> bool {
        self.matches_with(node, &[])
    }

    fn query_into<'a>(
        &self,
        node: &'a MarkupNode,
        ancestors: &mut Vec<&'a MarkupNode>,
        hits: &mut Vec<&'a MarkupNode>,
    ) {
        if self.matches_with(node, ancestors) {
            hits.push(node);
        }
        ancestors.push(node);
        for child in node.children() {
            self.query_into(child, ancestors, hits);
        }
        ancestors.pop();
    }

    fn matches_with(&self, node: &MarkupNode, ancestors: &[&MarkupNode]) -> bool {
        let Some((last, prefix)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(node) {
            return false;
        }
        // Descendant steps match greedily, nearest ancestor first.
        let mut remaining = prefix.len();
        for ancestor in ancestors.iter().rev() {
            if remaining == 0 {
                break;
            }
            if prefix[remaining - 1].matches(ancestor) {
                remaining -= 1;
            }
        }
        remaining == 0
    }
}

impl Compound {
    fn matches(&self, node: &MarkupNode) -> bool {
        let Some(tag) = node.tag() else {
            return false;
        };
        if let Some(want) = &self.tag {
            if !tag.eq_ignore_ascii_case(want) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| node.has_class(class)) {
            return false;
        }
        self.attrs.iter().all(|attr| attr.matches(node))
    }
}

impl AttrTest {
    fn matches(&self, node: &MarkupNode) -> bool {
        let Some(value) = node.attr(&self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Present => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::StartsWith(v) => value.starts_with(v.as_str()),
            AttrOp::Contains(v) => value.contains(v.as_str()),
        }
    }
}

/// Split a selector into compound tokens on whitespace, keeping whitespace
/// inside attribute brackets and quoted values intact.
fn split_compounds(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut in_brackets = false;
    let mut quote: Option<char> = None;

    for (i, c) in s.char_indices() {
        if c.is_whitespace() && !in_brackets && quote.is_none() {
            if let Some(from) = start.take() {
                tokens.push(&s[from..i]);
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        match c {
            _ if quote == Some(c) => quote = None,
            _ if quote.is_some() => {}
            '"' | '\'' if in_brackets => quote = Some(c),
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ => {}
        }
    }
    if let Some(from) = start {
        tokens.push(&s[from..]);
    }
    tokens
}

fn parse_compound(token: &str) -> std::result::Result<Compound, String> {
    let mut compound = Compound::default();
    let mut rest = token;

    let tag_len = leading_ident_len(rest);
    if tag_len > 0 {
        compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
        rest = &rest[tag_len..];
    }

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('#') {
            let len = leading_ident_len(after);
            if len == 0 {
                return Err(format!("expected an id after '#' in '{token}'"));
            }
            compound.id = Some(after[..len].to_string());
            rest = &after[len..];
        } else if let Some(after) = rest.strip_prefix('.') {
            let len = leading_ident_len(after);
            if len == 0 {
                return Err(format!("expected a class name after '.' in '{token}'"));
            }
            compound.classes.push(after[..len].to_string());
            rest = &after[len..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in '{token}'"))?;
            compound.attrs.push(parse_attr(&after[..end])?);
            rest = &after[end + 1..];
        } else {
            return Err(format!("unsupported selector syntax at '{rest}' in '{token}'"));
        }
    }

    if compound == Compound::default() {
        return Err(format!("selector part '{token}' matches nothing"));
    }
    Ok(compound)
}

fn leading_ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        .map_or(s.len(), |(i, _)| i)
}

fn parse_attr(inner: &str) -> std::result::Result<AttrTest, String> {
    let (name, op) = if let Some((name, value)) = inner.split_once("^=") {
        (name, AttrOp::StartsWith(unquote(value)))
    } else if let Some((name, value)) = inner.split_once("*=") {
        (name, AttrOp::Contains(unquote(value)))
    } else if let Some((name, value)) = inner.split_once('=') {
        (name, AttrOp::Equals(unquote(value)))
    } else {
        (inner, AttrOp::Present)
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("attribute test '[{inner}]' has no attribute name"));
    }
    Ok(AttrTest {
        name: name.to_string(),
        op,
    })
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).to_string()
}

/// An ordered list of fallback selectors: queries try each in turn and the
/// first selector producing results wins.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    /// Compile a list of selector strings, rejecting the whole list when any
    /// pattern fails to parse.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut selectors = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let selector = pattern
                .parse::<Selector>()
                .map_err(|e| ArchiveError::config(format!("invalid selector '{pattern}': {e}")))?;
            selectors.push(selector);
        }
        Ok(Self { selectors })
    }

    /// All matches of the first fallback that yields any, document order.
    #[must_use]
    pub fn query_all<'a>(&self, root: &'a MarkupNode) -> Vec<&'a MarkupNode> {
        for selector in &self.selectors {
            let hits = selector.query_all(root);
            if !hits.is_empty() {
                return hits;
            }
        }
        Vec::new()
    }

    /// First match of the first fallback that yields one.
    #[must_use]
    pub fn find_first<'a>(&self, root: &'a MarkupNode) -> Option<&'a MarkupNode> {
        self.selectors
            .iter()
            .find_map(|selector| selector.find_first(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn el(tag: &str, attrs: &[(&str, &str)], children: Vec<MarkupNode>) -> MarkupNode {
        MarkupNode::Element {
            tag: tag.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            children,
        }
    }

    fn sample_page() -> MarkupNode {
        el(
            "body",
            &[],
            vec![
                el(
                    "nav",
                    &[("aria-label", "Chat history")],
                    vec![el(
                        "div",
                        &[("id", "history")],
                        vec![
                            el("a", &[("href", "/c/aaa-111")], vec![]),
                            el("a", &[("href", "/c/bbb-222")], vec![]),
                        ],
                    )],
                ),
                el(
                    "article",
                    &[("data-testid", "conversation-turn-1")],
                    vec![el("div", &[("data-message-author-role", "user")], vec![])],
                ),
            ],
        )
    }

    #[test]
    fn parses_tag_id_class_combinations() {
        let sel: Selector = "div#history.sidebar".parse().unwrap();
        let node = el("div", &[("id", "history"), ("class", "sidebar open")], vec![]);
        assert!(sel.matches(&node));

        let other = el("div", &[("id", "history")], vec![]);
        assert!(!sel.matches(&other));
    }

    #[test]
    fn quoted_attribute_values_keep_their_spaces() {
        let sel: Selector = r#"nav[aria-label="Chat history"]"#.parse().unwrap();
        let node = el("nav", &[("aria-label", "Chat history")], vec![]);
        assert!(sel.matches(&node));
        assert!(!sel.matches(&el("nav", &[("aria-label", "Settings")], vec![])));
    }

    #[test]
    fn attribute_operators_match_like_the_page_queries() {
        let prefix: Selector = r#"a[href^="/c/"]"#.parse().unwrap();
        let contains: Selector = r#"a[href*="/c/"]"#.parse().unwrap();
        let node = el("a", &[("href", "/c/abc")], vec![]);
        let absolute = el("a", &[("href", "https://chatgpt.com/c/abc")], vec![]);

        assert!(prefix.matches(&node));
        assert!(!prefix.matches(&absolute));
        assert!(contains.matches(&absolute));
    }

    #[test]
    fn descendant_chain_requires_matching_ancestors() {
        let sel: Selector = r#"nav[aria-label="Chat history"] #history"#.parse().unwrap();
        let page = sample_page();
        let hits = sel.query_all(&page);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].attr("id"), Some("history"));

        let orphan: Selector = r#"aside #history"#.parse().unwrap();
        assert!(orphan.query_all(&page).is_empty());
    }

    #[test]
    fn query_excludes_the_root_node() {
        let sel: Selector = "article".parse().unwrap();
        let page = sample_page();
        let article = sel.find_first(&page).unwrap();
        assert!(sel.query_all(article).is_empty());
    }

    #[test]
    fn chain_returns_first_non_empty_fallback() {
        let chain = SelectorChain::compile(&[
            "aside #missing".to_string(),
            r#"a[href^="/c/"]"#.to_string(),
        ])
        .unwrap();
        let page = sample_page();
        let hits = chain.query_all(&page);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].attr("href"), Some("/c/aaa-111"));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_compile_time() {
        let err = SelectorChain::compile(&["a[href".to_string()]).unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
    }

    #[test]
    fn bare_attribute_test_matches_presence() {
        let sel: Selector = "[data-message-author-role]".parse().unwrap();
        let page = sample_page();
        assert_eq!(sel.query_all(&page).len(), 1);
    }
}
