//! Markup Recovery
//!
//! Canonical tree representation for generated markup, plus the
//! permissive parser that recovers a tree from imperfect model output.
//! The tree is the single hand-off point between generation and
//! conversion: converters never see raw text.

mod lexer;
mod parser;

pub use parser::parse;
pub(crate) use parser::is_void;

// =============================================================================
// Tree
// =============================================================================

/// One node of the canonical markup tree.
///
/// Attributes keep their source order; tag and attribute names are
/// lowercased during parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

impl MarkupNode {
    /// Build an element node (converter and test construction aid)
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            attrs.push((name.into(), value.into()));
        }
        self
    }

    pub fn with_child(mut self, child: MarkupNode) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Element tag, `None` for text nodes
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element { tag, .. } => Some(tag),
            Self::Text(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element { attrs, .. } => attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.as_str()),
            Self::Text(_) => None,
        }
    }

    /// Total node count of the subtree, including this node
    pub fn size(&self) -> usize {
        match self {
            Self::Element { children, .. } => {
                1 + children.iter().map(MarkupNode::size).sum::<usize>()
            }
            Self::Text(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_roundtrip() {
        let node = MarkupNode::element("button")
            .with_attr("class", "primary")
            .with_child(MarkupNode::text("Go"));
        assert_eq!(node.tag(), Some("button"));
        assert_eq!(node.attr("class"), Some("primary"));
        assert_eq!(node.attr("id"), None);
        assert_eq!(node.size(), 2);
    }
}
