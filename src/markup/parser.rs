//! Markup Parser
//!
//! Builds the canonical tree from the token stream with HTML-style
//! recovery. Degenerate input never loses data silently: recovery keeps
//! every non-noise token in the tree, and only input with no element at
//! all is rejected as malformed.
//!
//! ## Recovery Rules
//!
//! - Void elements (`br`, `img`, `input`, ...) never take children
//! - Missing end tags are implied: `p`, `li`, `option` close on a
//!   sibling open, `td`/`th`/`tr` close at the next cell or row
//! - A stray end tag with no matching open element is ignored; the text
//!   around it stays one node
//! - Whitespace between block-level siblings is dropped; after text or
//!   an inline element it collapses to a single separating space
//! - EOF closes every open element
//! - Multiple top-level elements are wrapped in an implicit `div` so the
//!   result is always a single rooted tree

use super::MarkupNode;
use super::lexer::{Lexer, Token};
use crate::types::{ForgeError, Result};
use tracing::debug;

/// Elements that cannot hold children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Elements whose inter-sibling whitespace separates words rather than
/// being formatting noise
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "code", "em", "i", "img", "kbd", "label", "small", "span", "strong", "sub",
    "sup",
];

fn is_inline(tag: &str) -> bool {
    INLINE_ELEMENTS.contains(&tag)
}

/// True when opening `incoming` implicitly closes an open `open` element
fn implies_close(open: &str, incoming: &str) -> bool {
    match open {
        "p" => incoming == "p",
        "li" => incoming == "li",
        "option" => incoming == "option",
        "td" | "th" => matches!(incoming, "td" | "th" | "tr"),
        "tr" => incoming == "tr",
        _ => false,
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Parse markup into a single rooted tree.
///
/// Fails with `MalformedMarkup` only when the input contains no element
/// at all; everything else is recovered.
pub fn parse(input: &str) -> Result<MarkupNode> {
    let tokens = Lexer::new(input).tokenize();
    let roots = build_forest(tokens);

    let mut elements = roots
        .iter()
        .filter(|node| matches!(node, MarkupNode::Element { .. }))
        .count();
    if elements == 0 {
        return Err(ForgeError::MalformedMarkup(
            "input contains no element".to_string(),
        ));
    }

    // Drop whitespace-only text between top-level elements, then root
    let mut roots: Vec<MarkupNode> = roots
        .into_iter()
        .filter(|node| match node {
            MarkupNode::Text(text) => !text.trim().is_empty(),
            MarkupNode::Element { .. } => true,
        })
        .collect();

    if roots.len() == 1 {
        return Ok(roots.remove(0));
    }

    elements = roots.len();
    debug!(roots = elements, "Wrapping multiple top-level nodes");
    Ok(MarkupNode::Element {
        tag: "div".to_string(),
        attrs: Vec::new(),
        children: roots,
    })
}

/// One open element under construction
struct OpenElement {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<MarkupNode>,
}

impl OpenElement {
    fn into_node(mut self) -> MarkupNode {
        // Inter-sibling spacing kept during the walk is noise at the
        // closing edge of the element
        let trailing_space = matches!(
            self.children.last(),
            Some(MarkupNode::Text(text)) if text.trim().is_empty()
        );
        if trailing_space {
            self.children.pop();
        }
        MarkupNode::Element {
            tag: self.tag,
            attrs: self.attrs,
            children: self.children,
        }
    }
}

fn build_forest(tokens: Vec<Token>) -> Vec<MarkupNode> {
    let mut roots: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();

    fn attach(roots: &mut Vec<MarkupNode>, stack: &mut [OpenElement], node: MarkupNode) {
        let siblings = match stack.last_mut() {
            Some(open) => &mut open.children,
            None => roots,
        };
        // A dropped stray end tag must not fragment the text around it
        if let MarkupNode::Text(text) = &node
            && let Some(MarkupNode::Text(prev)) = siblings.last_mut()
        {
            prev.push_str(text);
            return;
        }
        siblings.push(node);
    }

    for token in tokens {
        match token {
            Token::Text(text) => {
                // Whitespace-only runs after block-level content are
                // formatting noise; after text or an inline element
                // they separate words and collapse to one space.
                if text.trim().is_empty() {
                    let after_inline = match stack.last() {
                        Some(open) => open.children.last(),
                        None => roots.last(),
                    }
                    .is_some_and(|prev| match prev {
                        MarkupNode::Text(_) => true,
                        MarkupNode::Element { tag, .. } => is_inline(tag),
                    });
                    if !after_inline {
                        continue;
                    }
                    attach(&mut roots, &mut stack, MarkupNode::Text(" ".to_string()));
                    continue;
                }
                attach(&mut roots, &mut stack, MarkupNode::Text(text));
            }
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                // Implied closes cascade: a new <tr> closes an open
                // <td> and then the <tr> above it.
                while let Some(open) = stack.last() {
                    if !implies_close(&open.tag, &name) {
                        break;
                    }
                    let closed = stack.pop().expect("checked non-empty").into_node();
                    attach(&mut roots, &mut stack, closed);
                }

                if self_closing || is_void(&name) {
                    let node = MarkupNode::Element {
                        tag: name,
                        attrs,
                        children: Vec::new(),
                    };
                    attach(&mut roots, &mut stack, node);
                } else {
                    stack.push(OpenElement {
                        tag: name,
                        attrs,
                        children: Vec::new(),
                    });
                }
            }
            Token::EndTag { name } => {
                // Find the matching open element; a stray end tag is
                // ignored rather than corrupting the stack
                let Some(depth) = stack.iter().rposition(|open| open.tag == name) else {
                    debug!(tag = %name, "Ignoring stray end tag");
                    continue;
                };
                while stack.len() > depth {
                    let closed = stack.pop().expect("depth bounded").into_node();
                    attach(&mut roots, &mut stack, closed);
                }
            }
        }
    }

    // EOF closes whatever remains open
    while let Some(open) = stack.pop() {
        let node = open.into_node();
        attach(&mut roots, &mut stack, node);
    }

    roots
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &MarkupNode) -> (&str, &[(String, String)], &[MarkupNode]) {
        match node {
            MarkupNode::Element {
                tag,
                attrs,
                children,
            } => (tag.as_str(), attrs.as_slice(), children.as_slice()),
            MarkupNode::Text(text) => panic!("expected element, got text {text:?}"),
        }
    }

    #[test]
    fn test_nested_structure() {
        let tree = parse(r#"<div class="card"><span>hi</span></div>"#).unwrap();
        let (tag, attrs, children) = element(&tree);
        assert_eq!(tag, "div");
        assert_eq!(attrs, &[("class".to_string(), "card".to_string())]);
        let (tag, _, children) = element(&children[0]);
        assert_eq!(tag, "span");
        assert_eq!(children[0], MarkupNode::Text("hi".to_string()));
    }

    #[test]
    fn test_void_element_takes_no_children() {
        let tree = parse("<div><br>text</div>").unwrap();
        let (_, _, children) = element(&tree);
        assert_eq!(element(&children[0]).0, "br");
        assert_eq!(children[1], MarkupNode::Text("text".to_string()));
    }

    #[test]
    fn test_implied_close_on_sibling() {
        let tree = parse("<ul><li>one<li>two<li>three</ul>").unwrap();
        let (tag, _, children) = element(&tree);
        assert_eq!(tag, "ul");
        assert_eq!(children.len(), 3);
        for (child, expected) in children.iter().zip(["one", "two", "three"]) {
            let (tag, _, inner) = element(child);
            assert_eq!(tag, "li");
            assert_eq!(inner[0], MarkupNode::Text(expected.to_string()));
        }
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let tree = parse("<div>a</span>b</div>").unwrap();
        let (_, _, children) = element(&tree);
        assert_eq!(children, &[MarkupNode::Text("ab".to_string())]);
    }

    #[test]
    fn test_inline_sibling_space_preserved() {
        let tree = parse("<div><span>a</span> <span>b</span></div>").unwrap();
        let (_, _, children) = element(&tree);
        assert_eq!(children.len(), 3);
        assert_eq!(children[1], MarkupNode::Text(" ".to_string()));
    }

    #[test]
    fn test_block_sibling_whitespace_dropped() {
        let tree = parse("<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>").unwrap();
        let (tag, _, children) = element(&tree);
        assert_eq!(tag, "ul");
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_trailing_inline_space_pruned() {
        let tree = parse("<div><span>a</span> </div>").unwrap();
        let (_, _, children) = element(&tree);
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_eof_closes_open_elements() {
        let tree = parse("<div><span>dangling").unwrap();
        let (tag, _, children) = element(&tree);
        assert_eq!(tag, "div");
        let (tag, _, inner) = element(&children[0]);
        assert_eq!(tag, "span");
        assert_eq!(inner[0], MarkupNode::Text("dangling".to_string()));
    }

    #[test]
    fn test_multiple_roots_wrapped() {
        let tree = parse("<h1>a</h1><p>b</p>").unwrap();
        let (tag, attrs, children) = element(&tree);
        assert_eq!(tag, "div");
        assert!(attrs.is_empty());
        assert_eq!(children.len(), 2);
        assert_eq!(element(&children[0]).0, "h1");
        assert_eq!(element(&children[1]).0, "p");
    }

    #[test]
    fn test_no_element_is_malformed() {
        assert!(matches!(
            parse("just some prose").unwrap_err(),
            ForgeError::MalformedMarkup(_)
        ));
        assert!(matches!(
            parse("").unwrap_err(),
            ForgeError::MalformedMarkup(_)
        ));
    }

    #[test]
    fn test_unterminated_tag_becomes_text() {
        let tree = parse("<div><span class=\"x").unwrap();
        let (tag, _, children) = element(&tree);
        assert_eq!(tag, "div");
        assert_eq!(
            children,
            &[MarkupNode::Text("<span class=\"x".to_string())]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Recovery is total: arbitrary input never panics
            #[test]
            fn prop_parse_never_panics(input in "[ -~]{0,200}") {
                let _ = parse(&input);
            }

            // Any accepted input yields a single element root
            #[test]
            fn prop_accepted_input_is_single_rooted(
                input in r#"(<[a-z]{1,5}( [a-z]{1,4}="[a-z]{0,4}")?>|</[a-z]{1,5}>|[a-z ]{1,8}){0,20}"#
            ) {
                if let Ok(tree) = parse(&input) {
                    let rooted = matches!(tree, MarkupNode::Element { .. });
                    prop_assert!(rooted);
                }
            }
        }
    }

    #[test]
    fn test_table_cells_imply_close() {
        let tree = parse("<table><tr><td>a<td>b<tr><td>c</table>").unwrap();
        let (tag, _, rows) = element(&tree);
        assert_eq!(tag, "table");
        assert_eq!(rows.len(), 2);
        let (_, _, cells) = element(&rows[0]);
        assert_eq!(cells.len(), 2);
    }
}
