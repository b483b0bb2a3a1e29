//! Math rendering: MathML nodes → the configured [`MathEngine`] notation.
//!
//! pandoc (run with `--mathml`) turns every OMML equation into
//!
//! ```text
//! <math display="inline|block">
//!   <semantics>
//!     <mrow>…presentation…</mrow>
//!     <annotation encoding="application/x-tex">E = mc^{2}</annotation>
//!   </semantics>
//! </math>
//! ```
//!
//! | engine   | inline                    | display                          |
//! |----------|---------------------------|----------------------------------|
//! | mathml   | the `<math>` subtree      | the `<math>` subtree, own block  |
//! | latex    | `$tex$`                   | `$$\ntex\n$$`, own block         |
//! | plain    | visible text of the mrow  | same, own paragraph              |
//!
//! A node without a TeX annotation under `latex` is rendered as MathML and
//! reported, so one odd equation never fails the document.

use super::dom::{element_to_html, Display, Element, Node, Rendered};
use crate::config::MathEngine;
use serde::{Deserialize, Serialize};

const TEX_ENCODING: &str = "application/x-tex";

/// Elements whose text is significant in MathML; whitespace-only text
/// anywhere else is layout from the serialiser and may be dropped.
const TOKEN_ELEMENTS: &[&str] = &["mi", "mn", "mo", "ms", "mtext", "annotation"];

/// One detected math node and what it became.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathRecord {
    /// Serialised source markup.
    pub original: String,
    /// Text written to the output.
    pub rendered: String,
    /// `true` for display (block) math.
    pub display: bool,
}

/// Output of rendering one math node.
#[derive(Debug)]
pub struct MathOutcome {
    pub nodes: Vec<Node>,
    pub record: MathRecord,
    /// Set when `latex` had to fall back to MathML.
    pub fallback: Option<String>,
}

/// `<math>` from `--mathml`, or `<span class="math …">` from pandoc's
/// default TeX-in-HTML output.
pub fn is_math(el: &Element) -> bool {
    el.is("math") || (el.is("span") && el.has_class("math"))
}

pub fn render(el: Element, engine: MathEngine) -> MathOutcome {
    if el.is("math") {
        render_mathml(el, engine)
    } else {
        render_tex_span(el, engine)
    }
}

fn render_mathml(mut el: Element, engine: MathEngine) -> MathOutcome {
    compact(&mut el);
    let display = el
        .attr("display")
        .is_some_and(|d| d.eq_ignore_ascii_case("block"));
    let original = element_to_html(&el);

    let mut fallback = None;
    let (nodes, rendered) = match engine {
        MathEngine::Mathml => mathml(&original, display),
        MathEngine::Latex => match tex_annotation(&el) {
            Some(tex) => latex(&tex, display),
            None => {
                fallback = Some("no TeX annotation; kept as MathML".to_string());
                mathml(&original, display)
            }
        },
        MathEngine::Plain => plain(&visible_text(&el), display),
    };

    MathOutcome {
        nodes,
        record: MathRecord {
            original,
            rendered,
            display,
        },
        fallback,
    }
}

/// TeX source pandoc leaves in a span when it was not asked for MathML.
/// There is no MathML to keep, so `mathml` renders it as LaTeX.
fn render_tex_span(el: Element, engine: MathEngine) -> MathOutcome {
    let display = el.has_class("display");
    let original = element_to_html(&el);
    let text = el.text_content();
    let tex = strip_tex_delimiters(text.trim());

    let (nodes, rendered) = match engine {
        MathEngine::Mathml | MathEngine::Latex => latex(tex, display),
        MathEngine::Plain => plain(tex, display),
    };
    MathOutcome {
        nodes,
        record: MathRecord {
            original,
            rendered,
            display,
        },
        fallback: None,
    }
}

fn mathml(markup: &str, display: bool) -> (Vec<Node>, String) {
    let node = if display {
        Rendered::block(markup)
    } else {
        Rendered::inline(markup)
    };
    (vec![node], markup.to_string())
}

fn latex(tex: &str, display: bool) -> (Vec<Node>, String) {
    let tex = tex.trim();
    if display {
        let text = format!("$$\n{tex}\n$$");
        (vec![Rendered::block(text.clone())], text)
    } else {
        // Inline math must stay on one line
        let text = format!("${}$", collapse_whitespace(tex));
        (vec![Rendered::inline(text.clone())], text)
    }
}

fn plain(text: &str, display: bool) -> (Vec<Node>, String) {
    let text = collapse_whitespace(text);
    let node = if display {
        Node::Element(Element::with_children("p", vec![Node::Text(text.clone())]))
    } else {
        Node::Text(text.clone())
    };
    (vec![node], text)
}

fn tex_annotation(el: &Element) -> Option<String> {
    find_annotation(el)
        .map(|a| a.text_content().trim().to_string())
        .filter(|tex| !tex.is_empty())
}

fn find_annotation(el: &Element) -> Option<&Element> {
    for child in el.child_elements() {
        if child.is("annotation") && child.attr("encoding") == Some(TEX_ENCODING) {
            return Some(child);
        }
        if let Some(found) = find_annotation(child) {
            return Some(found);
        }
    }
    None
}

/// Text of the presentation markup, leaving out annotations.
fn visible_text(el: &Element) -> String {
    fn walk(nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) if el.is("annotation") || el.is("annotation-xml") => {}
                Node::Element(el) => walk(&el.children, out),
                _ => {}
            }
        }
    }
    let mut out = String::new();
    walk(&el.children, &mut out);
    out
}

/// Drop inter-element whitespace so the markup fits on one line.
fn compact(el: &mut Element) {
    let keep_blank = TOKEN_ELEMENTS.contains(&el.tag.as_str());
    el.children.retain(|n| keep_blank || !n.is_blank_text());
    for child in &mut el.children {
        if let Node::Element(inner) = child {
            compact(inner);
        }
    }
}

fn strip_tex_delimiters(tex: &str) -> &str {
    for (open, close) in [("\\(", "\\)"), ("\\[", "\\]"), ("$$", "$$"), ("$", "$")] {
        if let Some(inner) = tex.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            return inner.trim();
        }
    }
    tex
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MathOutcome {
    pub fn display(&self) -> Display {
        if self.record.display {
            Display::Block
        } else {
            Display::Inline
        }
    }
}
