//! Drawing and text-box containers.
//!
//! Text that lives inside a drawing canvas, an SVG or a text box is easy to
//! lose: the generic transliteration has no rule for those containers and
//! either drops them or scatters their runs. A shape is flattened into:
//!
//! ```text
//! <caption paragraph>          figcaption / <title> / aria-label / title
//! <text paragraph>             every text run inside, space-joined
//! <images>                     any pictures the shape held, rewritten as usual
//! ```

use super::dom::{Element, Node};

/// Class tokens pandoc and Word-derived HTML use for drawing containers.
const SHAPE_CLASSES: &[&str] = &["shape", "textbox", "text-box", "drawing", "canvas", "diagram"];

/// Elements whose text is never part of the visible shape content.
const SKIPPED: &[&str] = &["script", "style", "annotation", "annotation-xml", "desc"];

pub fn is_shape(el: &Element) -> bool {
    el.is("svg")
        || el.attr("data-shape").is_some()
        || SHAPE_CLASSES.iter().any(|class| el.has_class(class))
}

/// A `<figure>` whose content is a shape is handled as one shape, so its
/// caption comes first.
pub fn is_shape_figure(el: &Element) -> bool {
    el.is("figure") && el.child_elements().any(is_shape)
}

/// Pieces extracted from one shape.
#[derive(Debug, Default)]
pub struct ShapeParts {
    pub caption: Option<String>,
    pub text: Option<String>,
    /// `<img>` elements found inside, in document order.
    pub images: Vec<Element>,
}

impl ShapeParts {
    /// Caption paragraph then text paragraph. Images are handled by the
    /// caller since they need the media rewriter.
    pub fn paragraphs(&self) -> Vec<Node> {
        [&self.caption, &self.text]
            .into_iter()
            .flatten()
            .map(|t| Node::Element(Element::with_children("p", vec![Node::Text(t.clone())])))
            .collect()
    }
}

pub fn extract(el: Element) -> ShapeParts {
    let caption_source = caption_element(&el);
    let caption = caption_source
        .map(|c| collapse(&c.text_content()))
        .or_else(|| {
            ["aria-label", "title"]
                .iter()
                .filter_map(|name| el.attr(name))
                .map(collapse)
                .find(|t| !t.is_empty())
        })
        .filter(|t| !t.is_empty());
    let skip_tag = caption_source.map(|c| c.tag.clone());

    let mut runs = Vec::new();
    let mut images = Vec::new();
    collect(el.children, skip_tag.as_deref(), &mut runs, &mut images);

    let text = runs.join(" ");
    ShapeParts {
        caption,
        text: (!text.is_empty()).then_some(text),
        images,
    }
}

/// `figcaption`/`caption` of the container, or the `<title>` of an SVG.
fn caption_element(el: &Element) -> Option<&Element> {
    el.child_elements().find(|c| c.is("figcaption") || c.is("caption")).or_else(|| {
        el.child_elements()
            .filter(|c| c.is("svg"))
            .chain(std::iter::once(el).filter(|e| e.is("svg")))
            .find_map(|svg| svg.child_elements().find(|c| c.is("title")))
    })
}

fn collect(nodes: Vec<Node>, skip_tag: Option<&str>, runs: &mut Vec<String>, images: &mut Vec<Element>) {
    for node in nodes {
        match node {
            Node::Text(t) => {
                let t = collapse(&t);
                if !t.is_empty() {
                    runs.push(t);
                }
            }
            Node::Element(el) if el.is("img") => images.push(el),
            Node::Element(el) if SKIPPED.contains(&el.tag.as_str()) => {}
            // The caption element is emitted separately, once
            Node::Element(el) if Some(el.tag.as_str()) == skip_tag => {}
            Node::Element(el) => collect(el.children, skip_tag, runs, images),
            Node::Rendered(r) => {
                let t = collapse(&r.text);
                if !t.is_empty() {
                    runs.push(t);
                }
            }
            Node::Comment(_) => {}
        }
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
