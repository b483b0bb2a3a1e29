//! Inline style normalisation.
//!
//! pandoc spells the same style several ways (`<b>` vs `<strong>`,
//! `<span class="underline">` vs `<u>`) and Word documents routinely nest a
//! style inside itself when runs are split. Before the assembler sees the
//! tree every styled run is reduced to one canonical element per style, with
//! the outer-to-inner order of the source nesting. Because the tree is
//! properly nested, markers can then be emitted inside-out without ever
//! crossing.

use super::dom::{has_block_content, is_block_tag, Element, Node};

/// An inline style the assembler knows how to mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Strong,
    Emphasis,
    Strikethrough,
    Underline,
    Superscript,
    Subscript,
}

impl Style {
    pub fn tag(self) -> &'static str {
        match self {
            Style::Strong => "strong",
            Style::Emphasis => "em",
            Style::Strikethrough => "del",
            Style::Underline => "u",
            Style::Superscript => "sup",
            Style::Subscript => "sub",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The styles in force on the path from the root to a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleSet(u8);

impl StyleSet {
    pub fn contains(self, style: Style) -> bool {
        self.0 & style.bit() != 0
    }

    pub fn with(self, style: Style) -> Self {
        Self(self.0 | style.bit())
    }
}

/// The style an element applies, if any.
pub fn style_of(el: &Element) -> Option<Style> {
    match el.tag.as_str() {
        "b" | "strong" => Some(Style::Strong),
        "i" | "em" => Some(Style::Emphasis),
        "s" | "strike" | "del" => Some(Style::Strikethrough),
        "u" | "ins" => Some(Style::Underline),
        "sup" => Some(Style::Superscript),
        "sub" => Some(Style::Subscript),
        "span" if el.has_class("underline") => Some(Style::Underline),
        _ => None,
    }
}

/// Canonicalise one styled element whose children are already processed.
///
/// A style already active on an ancestor is dropped, as is a run with no
/// visible content. A run wrapping block content is pushed down into the
/// blocks so that block structure stays outermost.
pub fn normalise(el: Element, style: Style, active: StyleSet) -> Vec<Node> {
    if active.contains(style) || (el.text_content().trim().is_empty() && !has_media(&el)) {
        return el.children;
    }
    let children = el.children;
    if children.iter().any(has_block_content) {
        return push_down(style, children);
    }
    vec![Node::Element(Element::with_children(style.tag(), children))]
}

fn has_media(el: &Element) -> bool {
    el.children.iter().any(|n| match n {
        Node::Element(child) => child.is("img") || has_media(child),
        Node::Rendered(_) => true,
        _ => false,
    })
}

/// Re-apply `style` inside each block instead of around them.
fn push_down(style: Style, nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut run: Vec<Node> = Vec::new();

    let flush = |run: &mut Vec<Node>, out: &mut Vec<Node>| {
        if run.iter().all(Node::is_blank_text) {
            out.append(run);
        } else {
            let children = std::mem::take(run);
            out.push(Node::Element(Element::with_children(style.tag(), children)));
        }
    };

    for node in nodes {
        if !has_block_content(&node) {
            run.push(node);
            continue;
        }
        flush(&mut run, &mut out);
        match node {
            // Tables and rendered blocks are final; leave them alone
            Node::Element(el) if is_block_tag(&el.tag) && !el.is("table") => {
                let Element {
                    tag,
                    attrs,
                    children,
                } = el;
                out.push(Node::Element(Element {
                    tag,
                    attrs,
                    children: push_down(style, children),
                }));
            }
            other => out.push(other),
        }
    }
    flush(&mut run, &mut out);
    out
}

/// `<span>` and `<font>` carry nothing Markdown can express.
///
/// Bookmark anchors (`<span id="_Toc…" class="anchor"></span>`) vanish
/// with them since they have no children.
pub fn unwrap(el: Element) -> Vec<Node> {
    el.children
}

/// Merge adjacent runs of the same canonical style:
/// `<strong>a</strong><strong>b</strong>` → `<strong>ab</strong>`.
pub fn merge_adjacent(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let merge = match (out.last(), &node) {
            (Some(Node::Element(prev)), Node::Element(next)) => mergeable(prev, next),
            _ => false,
        };
        if merge {
            if let (Some(Node::Element(prev)), Node::Element(next)) = (out.last_mut(), node) {
                prev.children.extend(next.children);
                let children = std::mem::take(&mut prev.children);
                prev.children = merge_adjacent(children);
            }
            continue;
        }
        out.push(node);
    }
    out
}

fn mergeable(a: &Element, b: &Element) -> bool {
    a.tag == b.tag
        && a.attrs.is_empty()
        && b.attrs.is_empty()
        && matches!(a.tag.as_str(), "strong" | "em" | "del" | "u" | "sup" | "sub")
}
