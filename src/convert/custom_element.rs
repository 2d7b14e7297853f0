//! Custom Element Emitter
//!
//! Lowers the markup tree into a web-platform custom element rendering
//! into shadow DOM. The platform has no declarative list construct, so
//! detected runs fall back to literal expansion; the output stays
//! dependency-free JavaScript.

use super::{ConversionTarget, NodePath, escape_attr_value, escape_html_text, unsupported, valid_tag};
use crate::markup::{MarkupNode, is_void};
use crate::types::Result;

const TARGET: ConversionTarget = ConversionTarget::CustomElement;

pub(super) fn emit(root: &MarkupNode, name: &str) -> Result<String> {
    let path = match root {
        MarkupNode::Element { tag, .. } => NodePath::root(tag),
        MarkupNode::Text(_) => NodePath::default(),
    };
    let markup = render_node(root, &path, 3)?;

    let tag_name = element_tag(name);
    let mut out = String::new();
    out.push_str(&format!("class {name}Element extends HTMLElement {{\n"));
    out.push_str("  connectedCallback() {\n");
    out.push_str("    this.attachShadow({ mode: 'open' });\n");
    out.push_str("    this.shadowRoot.innerHTML = `\n");
    out.push_str(&markup);
    out.push_str("    `;\n");
    out.push_str("  }\n");
    out.push_str("}\n\n");
    out.push_str(&format!(
        "customElements.define('{tag_name}', {name}Element);\n"
    ));
    Ok(out)
}

/// Derive the element tag from the PascalCase component name. Custom
/// element names require a dash, so a single-word name gets an `x-`
/// prefix.
fn element_tag(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    if !out.contains('-') {
        out.insert_str(0, "x-");
    }
    out
}

fn render_node(node: &MarkupNode, path: &NodePath, depth: usize) -> Result<String> {
    let pad = "  ".repeat(depth);
    match node {
        MarkupNode::Text(text) => Ok(format!("{pad}{}\n", template_text(text))),
        MarkupNode::Element {
            tag,
            attrs,
            children,
        } => {
            if !valid_tag(tag) {
                return Err(unsupported(TARGET, path, format!("invalid tag '{tag}'")));
            }
            let attrs = render_attrs(attrs);

            if children.is_empty() {
                if is_void(tag) {
                    return Ok(format!("{pad}<{tag}{attrs}>\n"));
                }
                return Ok(format!("{pad}<{tag}{attrs}></{tag}>\n"));
            }
            if let [MarkupNode::Text(text)] = children.as_slice() {
                return Ok(format!(
                    "{pad}<{tag}{attrs}>{}</{tag}>\n",
                    template_text(text)
                ));
            }

            let mut out = format!("{pad}<{tag}{attrs}>\n");
            for (index, child) in children.iter().enumerate() {
                let child_path = path.child(child.tag().unwrap_or("text"), index);
                out.push_str(&render_node(child, &child_path, depth + 1)?);
            }
            out.push_str(&format!("{pad}</{tag}>\n"));
            Ok(out)
        }
    }
}

fn render_attrs(attrs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        out.push(' ');
        if value.is_empty() {
            out.push_str(name);
        } else {
            out.push_str(&format!("{name}=\"{}\"", template_attr(value)));
        }
    }
    out
}

/// Text inside the innerHTML template literal: HTML entities plus
/// backtick and `${` escaping for the surrounding literal.
fn template_text(text: &str) -> String {
    escape_template(&escape_html_text(text))
}

fn template_attr(value: &str) -> String {
    escape_template(&escape_attr_value(value))
}

fn escape_template(text: &str) -> String {
    text.replace('`', "\\`").replace("${", "\\${")
}

// =============================================================================
// Tests
// =============================================================================
