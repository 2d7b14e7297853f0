//! Svelte Emitter
//!
//! Lowers the markup tree into a Svelte single-file component. Detected
//! runs become `{#each}` blocks over consts declared in the script
//! section; attributes pass through unchanged since Svelte keeps HTML
//! spellings.

use super::pattern::{Segment, segment};
use super::{
    ConversionTarget, NodePath, escape_attr_value, js_string, unsupported, valid_tag,
};
use crate::markup::MarkupNode;
use crate::types::Result;

const TARGET: ConversionTarget = ConversionTarget::Svelte;

pub(super) fn emit(root: &MarkupNode) -> Result<String> {
    let mut emitter = SvelteEmitter { lists: Vec::new() };
    let path = match root {
        MarkupNode::Element { tag, .. } => NodePath::root(tag),
        MarkupNode::Text(_) => NodePath::default(),
    };
    let markup = emitter.node(root, &path, 0)?;

    let mut out = String::new();
    if !emitter.lists.is_empty() {
        out.push_str("<script>\n");
        for (index, items) in emitter.lists.iter().enumerate() {
            let literals: Vec<String> = items.iter().map(|item| js_string(item)).collect();
            out.push_str(&format!(
                "  const items{} = [{}];\n",
                index + 1,
                literals.join(", ")
            ));
        }
        out.push_str("</script>\n\n");
    }
    out.push_str(&markup);
    Ok(out)
}

struct SvelteEmitter {
    lists: Vec<Vec<String>>,
}

impl SvelteEmitter {
    fn node(&mut self, node: &MarkupNode, path: &NodePath, depth: usize) -> Result<String> {
        let pad = "  ".repeat(depth);
        match node {
            MarkupNode::Text(text) => Ok(format!("{pad}{}\n", svelte_text(text))),
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
                    return Ok(format!("{pad}<{tag}{attrs} />\n"));
                }
                if let [MarkupNode::Text(text)] = children.as_slice() {
                    return Ok(format!("{pad}<{tag}{attrs}>{}</{tag}>\n", svelte_text(text)));
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
        let attrs = render_attrs(run.attrs);
        self.lists
            .push(run.items.iter().map(|s| s.to_string()).collect());
        let var = format!("items{}", self.lists.len());

        let pad = "  ".repeat(depth);
        let inner = "  ".repeat(depth + 1);
        Ok(format!(
            "{pad}{{#each {var} as item}}\n\
             {inner}<{tag}{attrs}>{{item}}</{tag}>\n\
             {pad}{{/each}}\n",
            tag = run.tag,
        ))
    }
}

fn render_attrs(attrs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        out.push(' ');
        if value.is_empty() {
            out.push_str(name);
        } else {
            out.push_str(&format!("{name}=\"{}\"", escape_attr_value(value)));
        }
    }
    out
}

/// Svelte text: entity-escape braces along with HTML-significant
/// characters, since `{` opens an expression.
fn svelte_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert;

    fn svelte(node: &MarkupNode) -> String {
        convert(node, ConversionTarget::Svelte).unwrap()
    }

    #[test]
    fn test_attrs_keep_html_spelling() {
        let tree = MarkupNode::element("div")
            .with_attr("class", "flex gap-2")
            .with_child(MarkupNode::text("hi"));
        let out = svelte(&tree);
        assert!(out.contains("<div class=\"flex gap-2\">hi</div>"));
    }

    #[test]
    fn test_no_script_without_runs() {
        let tree = MarkupNode::element("p").with_child(MarkupNode::text("x"));
        assert!(!svelte(&tree).contains("<script>"));
    }

    #[test]
    fn test_run_becomes_each_block() {
        let li = |t: &str| MarkupNode::element("li").with_child(MarkupNode::text(t));
        let tree = MarkupNode::element("ul")
            .with_child(li("a"))
            .with_child(li("b"))
            .with_child(li("c"));
        let out = svelte(&tree);
        assert!(out.starts_with("<script>\n  const items1 = ['a', 'b', 'c'];\n</script>"));
        assert!(out.contains("{#each items1 as item}"));
        assert!(out.contains("<li>{item}</li>"));
        assert!(out.contains("{/each}"));
    }

    #[test]
    fn test_braces_in_text_entity_escaped() {
        let tree = MarkupNode::element("code").with_child(MarkupNode::text("f() { }"));
        assert!(svelte(&tree).contains("f() &#123; &#125;"));
    }
}
