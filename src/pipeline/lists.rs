//! List repair.
//!
//! Word numbering survives pandoc as nested `<ul>`/`<ol>`, but HTML from
//! other sources (and pandoc on odd numbering definitions) puts a nested
//! list or a continuation paragraph *between* `<li>` elements. A naive
//! writer then emits it as a sibling of the list and the item loses its
//! continuation. Here stray content is re-attached to the item before it,
//! and items that mix inline text with blocks get their text wrapped in a
//! paragraph so the assembler can indent every block by item depth.

use super::dom::{has_block_content, Element, Node};

/// Re-home stray list children into the preceding item.
pub fn normalise_list(mut list: Element) -> Element {
    let children = std::mem::take(&mut list.children);
    let mut items: Vec<Element> = Vec::new();
    let mut touched: Vec<bool> = Vec::new();

    for child in children {
        match child {
            Node::Element(li) if li.is("li") => {
                items.push(li);
                touched.push(false);
            }
            Node::Comment(_) => {}
            blank if blank.is_blank_text() => {}
            stray => match items.last_mut() {
                Some(prev) => {
                    prev.children.push(stray);
                    if let Some(flag) = touched.last_mut() {
                        *flag = true;
                    }
                }
                None => {
                    items.push(Element::with_children("li", vec![stray]));
                    touched.push(true);
                }
            },
        }
    }

    list.children = items
        .into_iter()
        .zip(touched)
        .map(|(li, touched)| {
            Node::Element(if touched { normalise_item(li) } else { li })
        })
        .collect();
    list
}

/// Wrap inline runs in `<p>` when the item also holds blocks.
pub fn normalise_item(mut item: Element) -> Element {
    if !item.children.iter().any(has_block_content) {
        return item;
    }

    let children = std::mem::take(&mut item.children);
    let mut run: Vec<Node> = Vec::new();
    for child in children {
        if has_block_content(&child) {
            flush(&mut run, &mut item.children);
            item.children.push(child);
        } else {
            run.push(child);
        }
    }
    flush(&mut run, &mut item.children);
    item
}

fn flush(run: &mut Vec<Node>, out: &mut Vec<Node>) {
    if run.iter().all(|n| n.is_blank_text() || matches!(n, Node::Comment(_))) {
        run.clear();
        return;
    }
    out.push(Node::Element(Element::with_children("p", std::mem::take(run))));
}

/// Number of non-list blocks in an item; more than one makes a list loose.
pub fn block_count(item: &Element) -> usize {
    item.children
        .iter()
        .filter(|n| match n {
            Node::Element(el) => !(el.is("ul") || el.is("ol")) && has_block_content(n),
            Node::Rendered(_) => has_block_content(n),
            _ => false,
        })
        .count()
}
