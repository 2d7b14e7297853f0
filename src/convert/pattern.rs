//! Structural Pattern Detection
//!
//! Pure analysis over a sibling list that finds repetition worth lifting
//! into a target-native list construct. Detection is shared by all
//! emitters; whether a run becomes `.map()`, `{#each}`, or stays literal
//! is the emitter's call.

use crate::markup::MarkupNode;

/// Minimum consecutive repeats before a run is lifted into a list
/// construct. Below this, literal output reads better than a loop.
pub const MIN_RUN_LEN: usize = 3;

/// One span of a sibling list after pattern analysis.
#[derive(Debug)]
pub enum Segment<'a> {
    /// A node emitted as-is
    Node(&'a MarkupNode),
    /// A run of identical-shape siblings differing only in text
    Run(ListRun<'a>),
}

/// A detected repetition: `len >= MIN_RUN_LEN` consecutive elements with
/// the same tag, the same attributes, and exactly one text child each.
#[derive(Debug)]
pub struct ListRun<'a> {
    pub tag: &'a str,
    pub attrs: &'a [(String, String)],
    /// The text payload of each repeated element, in order
    pub items: Vec<&'a str>,
}

/// Text payload of an element that qualifies as a run member: one text
/// child and nothing else.
fn run_payload(node: &MarkupNode) -> Option<(&str, &[(String, String)], &str)> {
    let MarkupNode::Element {
        tag,
        attrs,
        children,
    } = node
    else {
        return None;
    };
    match children.as_slice() {
        [MarkupNode::Text(text)] => Some((tag, attrs, text)),
        _ => None,
    }
}

/// Split a sibling list into literal nodes and detected runs.
///
/// Deterministic and greedy: runs extend as far as the shape matches,
/// and every input node appears in exactly one segment.
pub fn segment(children: &[MarkupNode]) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut i = 0;

    while i < children.len() {
        let Some((tag, attrs, first)) = run_payload(&children[i]) else {
            segments.push(Segment::Node(&children[i]));
            i += 1;
            continue;
        };

        let mut items = vec![first];
        let mut j = i + 1;
        while j < children.len() {
            match run_payload(&children[j]) {
                Some((t, a, text)) if t == tag && a == attrs => {
                    items.push(text);
                    j += 1;
                }
                _ => break,
            }
        }

        if items.len() >= MIN_RUN_LEN {
            segments.push(Segment::Run(ListRun { tag, attrs, items }));
            i = j;
        } else {
            segments.push(Segment::Node(&children[i]));
            i += 1;
        }
    }

    segments
}

// =============================================================================
// Tests
// =============================================================================
