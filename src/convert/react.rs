//! React Emitter
//!
//! Lowers the markup tree into a JSX function component. Detected runs
//! become `Array.map` over a hoisted const; attribute names are mapped
//! to their DOM-property spellings (`class` -> `className`, inline
//! `style` strings -> style objects).

use super::pattern::{Segment, segment};
use super::{ConversionTarget, NodePath, js_string, unsupported, valid_tag};
use crate::markup::MarkupNode;
use crate::types::Result;

const TARGET: ConversionTarget = ConversionTarget::React;

pub(super) fn emit(root: &MarkupNode, name: &str) -> Result<String> {
    let mut emitter = ReactEmitter { lists: Vec::new() };
    let path = match root {
        MarkupNode::Element { tag, .. } => NodePath::root(tag),
        MarkupNode::Text(_) => NodePath::default(),
    };
    let body = emitter.node(root, &path, 2)?;

    let mut out = String::new();
    out.push_str(&format!("export function {name}() {{\n"));
    for (index, items) in emitter.lists.iter().enumerate() {
        let literals: Vec<String> = items.iter().map(|item| js_string(item)).collect();
        out.push_str(&format!(
            "  const items{} = [{}];\n",
            index + 1,
            literals.join(", ")
        ));
    }
    if !emitter.lists.is_empty() {
        out.push('\n');
    }
    out.push_str("  return (\n");
    out.push_str(&body);
    out.push_str("  );\n");
    out.push_str("}\n");
    Ok(out)
}

struct ReactEmitter {
    /// Hoisted item arrays, one per detected run, in emission order
    lists: Vec<Vec<String>>,
}

impl ReactEmitter {
    fn node(&mut self, node: &MarkupNode, path: &NodePath, depth: usize) -> Result<String> {
        let pad = "  ".repeat(depth);
        match node {
            MarkupNode::Text(text) => Ok(format!("{pad}{}\n", jsx_text(text))),
            MarkupNode::Element {
                tag,
                attrs,
                children,
            } => {
                if !valid_tag(tag) {
                    return Err(unsupported(TARGET, path, format!("invalid tag '{tag}'")));
                }
                let attrs = self.render_attrs(attrs, path)?;

                if children.is_empty() {
                    return Ok(format!("{pad}<{tag}{attrs} />\n"));
                }

                // Single text child stays on one line
                if let [MarkupNode::Text(text)] = children.as_slice() {
                    return Ok(format!("{pad}<{tag}{attrs}>{}</{tag}>\n", jsx_text(text)));
                }

                let mut out = format!("{pad}<{tag}{attrs}>\n");
                let mut index = 0;
                for seg in segment(children) {
                    match seg {
                        Segment::Node(child) => {
                            let child_path = path.child(child.tag().unwrap_or("text"), index);
                            out.push_str(&self.node(child, &child_path, depth + 1)?);
                            index += 1;
                        }
                        Segment::Run(run) => {
                            let child_path = path.child(run.tag, index);
                            out.push_str(&self.run(&run, &child_path, depth + 1)?);
                            index += run.items.len();
                        }
                    }
                }
                out.push_str(&format!("{pad}</{tag}>\n"));
                Ok(out)
            }
        }
    }

    fn run(
        &mut self,
        run: &super::pattern::ListRun<'_>,
        path: &NodePath,
        depth: usize,
    ) -> Result<String> {
        if !valid_tag(run.tag) {
            return Err(unsupported(TARGET, path, format!("invalid tag '{}'", run.tag)));
        }
        let attrs = self.render_attrs(run.attrs, path)?;
        self.lists
            .push(run.items.iter().map(|s| s.to_string()).collect());
        let var = format!("items{}", self.lists.len());

        let pad = "  ".repeat(depth);
        let inner = "  ".repeat(depth + 1);
        Ok(format!(
            "{pad}{{{var}.map((item, index) => (\n\
             {inner}<{tag} key={{index}}{attrs}>{{item}}</{tag}>\n\
             {pad}))}}\n",
            tag = run.tag,
        ))
    }

    fn render_attrs(&self, attrs: &[(String, String)], path: &NodePath) -> Result<String> {
        let mut out = String::new();
        for (name, value) in attrs {
            out.push(' ');
            out.push_str(&self.render_attr(name, value, path)?);
        }
        Ok(out)
    }

    fn render_attr(&self, name: &str, value: &str, path: &NodePath) -> Result<String> {
        if name.contains(':') || name.contains('@') {
            return Err(unsupported(
                TARGET,
                path,
                format!("attribute '{name}' has no JSX spelling"),
            ));
        }

        if name == "style" {
            return Ok(format!("style={}", style_object(value)));
        }

        let jsx_name = jsx_attr_name(name);
        if value.is_empty() {
            // Bare attribute is a boolean prop
            return Ok(jsx_name);
        }
        Ok(format!("{jsx_name}=\"{}\"", value.replace('"', "&quot;")))
    }
}

/// Map an attribute name to its JSX spelling. `data-*` and `aria-*`
/// keep their kebab form; everything else with a dash is camelCased.
fn jsx_attr_name(name: &str) -> String {
    match name {
        "class" => return "className".to_string(),
        "for" => return "htmlFor".to_string(),
        "tabindex" => return "tabIndex".to_string(),
        "readonly" => return "readOnly".to_string(),
        "maxlength" => return "maxLength".to_string(),
        _ => {}
    }
    if name.starts_with("data-") || name.starts_with("aria-") {
        return name.to_string();
    }
    camel_case(name)
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Lower an inline `style` string into a JSX style object literal.
fn style_object(style: &str) -> String {
    let props: Vec<String> = style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            Some(format!(
                "{}: {}",
                camel_case(prop),
                js_string(value.trim())
            ))
        })
        .collect();
    format!("{{{{ {} }}}}", props.join(", "))
}

/// JSX text: content containing JSX-significant characters is wrapped
/// in a string expression instead of entity-escaped.
fn jsx_text(text: &str) -> String {
    if text.contains(['{', '}', '<', '>']) {
        format!("{{{}}}", js_string(text))
    } else {
        text.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
