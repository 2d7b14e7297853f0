//! Conversion Compiler
//!
//! Lowers the canonical markup tree into framework-native source text.
//! Conversion is pure and deterministic: the same tree and target always
//! produce byte-identical output, with no network or model involvement.
//!
//! Each target is a separate emitter behind one dispatch point. Emitters
//! share pattern detection ([`pattern`]) but make their own lowering
//! decisions; a target that cannot represent a construct fails with
//! `UnsupportedConstruct` naming the node path rather than guessing.

mod custom_element;
mod pattern;
mod react;
mod svelte;

pub use pattern::MIN_RUN_LEN;

use crate::markup::MarkupNode;
use crate::types::{ForgeError, Result};
use tracing::debug;

/// Default component name when the caller does not supply one
pub const DEFAULT_COMPONENT_NAME: &str = "UiGenerated";

// =============================================================================
// Targets
// =============================================================================

/// Output dialect for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConversionTarget {
    /// JSX function component
    React,
    /// Svelte single-file component
    Svelte,
    /// Web-platform custom element class
    CustomElement,
}

impl std::fmt::Display for ConversionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::React => "react",
            Self::Svelte => "svelte",
            Self::CustomElement => "custom-element",
        };
        f.write_str(name)
    }
}

impl ConversionTarget {
    /// Conventional file extension for the emitted source
    pub fn extension(&self) -> &'static str {
        match self {
            Self::React => "jsx",
            Self::Svelte => "svelte",
            Self::CustomElement => "js",
        }
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Convert a markup tree for a target using the default component name.
pub fn convert(root: &MarkupNode, target: ConversionTarget) -> Result<String> {
    convert_named(root, target, DEFAULT_COMPONENT_NAME)
}

/// Convert a markup tree, naming the emitted component.
///
/// `name` must be PascalCase-compatible; it becomes the React function
/// name and the custom element class/tag. Svelte output carries no name.
pub fn convert_named(root: &MarkupNode, target: ConversionTarget, name: &str) -> Result<String> {
    if !is_pascal_case(name) {
        return Err(ForgeError::UnsupportedConstruct {
            target,
            path: String::new(),
            message: format!("component name '{name}' is not PascalCase"),
        });
    }

    debug!(%target, nodes = root.size(), "Converting");
    match target {
        ConversionTarget::React => react::emit(root, name),
        ConversionTarget::Svelte => svelte::emit(root),
        ConversionTarget::CustomElement => custom_element::emit(root, name),
    }
}

fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

// =============================================================================
// Shared Emitter Support
// =============================================================================

/// Path to a node for diagnostics, rendered as `div[0]/span[2]`.
#[derive(Debug, Default, Clone)]
pub(crate) struct NodePath {
    segments: Vec<(String, usize)>,
}

impl NodePath {
    pub(crate) fn root(tag: &str) -> Self {
        Self {
            segments: vec![(tag.to_string(), 0)],
        }
    }

    pub(crate) fn child(&self, tag: &str, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push((tag.to_string(), index));
        Self { segments }
    }

    pub(crate) fn render(&self) -> String {
        self.segments
            .iter()
            .map(|(tag, index)| format!("{tag}[{index}]"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Tag names every target can carry: leading letter, then letters,
/// digits, or dashes.
pub(crate) fn valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub(crate) fn unsupported(
    target: ConversionTarget,
    path: &NodePath,
    message: impl Into<String>,
) -> ForgeError {
    ForgeError::UnsupportedConstruct {
        target,
        path: path.render(),
        message: message.into(),
    }
}

/// Escape text for HTML-flavored output (Svelte markup, shadow DOM
/// templates).
pub(crate) fn escape_html_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for double-quoted HTML-flavored output.
pub(crate) fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Quote a string as a JS single-quoted literal.
pub(crate) fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_is_deterministic() {
        let tree = MarkupNode::element("div")
            .with_attr("class", "flex gap-2")
            .with_child(MarkupNode::element("span").with_child(MarkupNode::text("hi")));
        for target in [
            ConversionTarget::React,
            ConversionTarget::Svelte,
            ConversionTarget::CustomElement,
        ] {
            let first = convert(&tree, target).unwrap();
            let second = convert(&tree, target).unwrap();
            assert_eq!(first, second, "nondeterministic output for {target}");
        }
    }

    #[test]
    fn test_structure_and_order_preserved() {
        let tree = crate::markup::parse(
            r#"<form class="grid gap-4"><label for="email">Email</label><input type="email"><button class="primary">Send</button></form>"#,
        )
        .unwrap();
        let out = convert(&tree, ConversionTarget::Svelte).unwrap();

        // Children appear in source order, classes verbatim
        let label = out.find("<label").unwrap();
        let input = out.find("<input").unwrap();
        let button = out.find("<button").unwrap();
        assert!(label < input && input < button);
        assert!(out.contains("class=\"grid gap-4\""));
        assert!(out.contains("class=\"primary\""));
    }

    #[test]
    fn test_rejects_non_pascal_name() {
        let tree = MarkupNode::element("div");
        let err = convert_named(&tree, ConversionTarget::React, "not-pascal").unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_node_path_rendering() {
        let path = NodePath::root("div").child("ul", 1).child("li", 3);
        assert_eq!(path.render(), "div[0]/ul[1]/li[3]");
    }

    #[test]
    fn test_valid_tag() {
        assert!(valid_tag("div"));
        assert!(valid_tag("my-widget"));
        assert!(!valid_tag("9lives"));
        assert!(!valid_tag(""));
        assert!(!valid_tag("a b"));
    }
}
