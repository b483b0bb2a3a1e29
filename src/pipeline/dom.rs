//! Typed HTML tree for the intermediate document.
//!
//! ## Why not walk the html5ever DOM directly?
//!
//! `markup5ever_rcdom` nodes are `Rc<RefCell<…>>` graphs: they are `!Send`,
//! every access borrows at runtime, and rewriting a subtree means juggling
//! weak parent pointers. The processor instead works on an owned, closed enum
//! ([`Node`]) so each rule is a plain `Vec<Node> → Vec<Node>` transform that
//! the compiler checks exhaustively.
//!
//! ```text
//! HTML text ──html5ever──▶ RcDom ──convert──▶ Vec<Node>
//!                                             ├─ Text
//!                                             ├─ Element { tag, attrs, children }
//!                                             ├─ Comment
//!                                             └─ Rendered (processor output only)
//! ```
//!
//! [`Node::Rendered`] never comes out of the parser. The structural processor
//! uses it for substructures it has already turned into final text (an
//! embedded table, a `$…$` formula) so later stages copy them verbatim.

use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// One node of the intermediate document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
    Comment(String),
    Rendered(Rendered),
}

/// An element with its attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Local name, lowercase for HTML elements.
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Already-final output for a substructure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub display: Display,
}

/// Whether rendered content flows with text or stands as its own block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Inline,
    Block,
}

impl Rendered {
    pub fn inline(text: impl Into<String>) -> Node {
        Node::Rendered(Rendered {
            text: text.into(),
            display: Display::Inline,
        })
    }

    pub fn block(text: impl Into<String>) -> Node {
        Node::Rendered(Rendered {
            text: text.into(),
            display: Display::Block,
        })
    }
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: &str, children: Vec<Node>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self
            .attrs
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|token| token == class))
    }

    /// Direct element children.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Concatenated descendant text, including rendered fragments.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// First descendant element (depth-first) with this tag.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.is(tag) {
                return Some(child);
            }
            if let Some(found) = child.find(tag) {
                return Some(found);
            }
        }
        None
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(std::slice::from_ref(self), &mut out);
        out
    }

    /// Text that is empty or only whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Rendered(r) => out.push_str(&r.text),
            Node::Comment(_) => {}
        }
    }
}

// ── Classification ───────────────────────────────────────────────────────

/// Elements that start a new block in Markdown.
pub fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "body"
            | "center"
            | "dd"
            | "details"
            | "div"
            | "dl"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "html"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "summary"
            | "table"
            | "ul"
    )
}

/// Whether a node (or anything inside it) forces block layout.
pub fn has_block_content(node: &Node) -> bool {
    match node {
        Node::Element(el) => is_block_tag(&el.tag) || el.children.iter().any(has_block_content),
        Node::Rendered(r) => r.display == Display::Block,
        Node::Text(_) | Node::Comment(_) => false,
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// A parsed document: the top-level nodes below the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Content of `<body>`, or every top-level node when there is none.
    pub fn into_body(self) -> Vec<Node> {
        match take_body(self.nodes) {
            Ok(body) => body,
            Err(nodes) => nodes,
        }
    }
}

fn take_body(nodes: Vec<Node>) -> Result<Vec<Node>, Vec<Node>> {
    let mut rest = Vec::with_capacity(nodes.len());
    let mut iter = nodes.into_iter();
    while let Some(node) = iter.next() {
        match node {
            Node::Element(el) if el.is("body") => return Ok(el.children),
            Node::Element(el) if el.is("html") => match take_body(el.children) {
                Ok(body) => return Ok(body),
                Err(children) => rest.push(Node::Element(Element { children, ..el })),
            },
            other => rest.push(other),
        }
    }
    Err(rest)
}

/// Parse an HTML document with the HTML5 tree-construction algorithm.
pub fn parse_html(html: &str) -> Document {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let dom = parse_document(RcDom::default(), opts).one(html);
    let nodes = dom
        .document
        .children
        .borrow()
        .iter()
        .filter_map(convert)
        .collect();
    Document { nodes }
}

fn convert(handle: &Handle) -> Option<Node> {
    match &handle.data {
        NodeData::Text { contents } => Some(Node::Text(contents.borrow().to_string())),
        NodeData::Comment { contents } => Some(Node::Comment(contents.to_string())),
        NodeData::Element { name, attrs, .. } => {
            let attrs = attrs
                .borrow()
                .iter()
                .map(|a| {
                    let key = match &a.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, a.name.local),
                        None => a.name.local.to_string(),
                    };
                    (key, a.value.to_string())
                })
                .collect();
            let children = handle.children.borrow().iter().filter_map(convert).collect();
            Some(Node::Element(Element {
                tag: name.local.to_string(),
                attrs,
                children,
            }))
        }
        NodeData::Document
        | NodeData::Doctype { .. }
        | NodeData::ProcessingInstruction { .. } => None,
    }
}

// ── Serialisation ────────────────────────────────────────────────────────

/// Elements that never have content or a closing tag.
fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

/// Serialise nodes back to HTML. Comments are dropped; rendered fragments
/// are copied as-is.
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_html(nodes, &mut out);
    out
}

pub fn element_to_html(el: &Element) -> String {
    let mut out = String::new();
    write_element(el, &mut out);
    out
}

fn write_html(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => escape_text(t, out),
            Node::Element(el) => write_element(el, out),
            Node::Rendered(r) => out.push_str(&r.text),
            Node::Comment(_) => {}
        }
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if is_void(&el.tag) {
        return;
    }
    write_html(&el.children, out);
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(html: &str) -> Vec<Node> {
        parse_html(html).into_body()
    }

    #[test]
    fn parses_fragment_into_body() {
        let nodes = body("<p>Hello <b>world</b></p>");
        assert_eq!(nodes.len(), 1);
        let p = nodes[0].as_element().unwrap();
        assert!(p.is("p"));
        assert_eq!(p.text_content(), "Hello world");
    }

    #[test]
    fn head_is_not_part_of_body() {
        let nodes = body(
            "<!DOCTYPE html><html><head><title>T</title></head><body><p>x</p></body></html>",
        );
        assert_eq!(to_html(&nodes), "<p>x</p>");
    }

    #[test]
    fn attributes_keep_source_order() {
        let nodes = body(r#"<table><tr><td rowspan="2" colspan="3">a</td></tr></table>"#);
        let table = nodes[0].as_element().unwrap();
        let td = table.find("td").unwrap();
        assert_eq!(td.attrs[0], ("rowspan".to_string(), "2".to_string()));
        assert_eq!(td.attrs[1], ("colspan".to_string(), "3".to_string()));
    }

    #[test]
    fn mathml_round_trips_through_serialiser() {
        let math = r#"<math display="inline" xmlns="http://www.w3.org/1998/Math/MathML"><semantics><mrow><mi>E</mi><mo>=</mo><mi>m</mi><msup><mi>c</mi><mn>2</mn></msup></mrow><annotation encoding="application/x-tex">E = mc^{2}</annotation></semantics></math>"#;
        let nodes = body(&format!("<p>{math}</p>"));
        let p = nodes[0].as_element().unwrap();
        assert_eq!(to_html(&p.children), math);
    }

    #[test]
    fn serialiser_escapes_text_and_attributes() {
        let mut el = Element::with_children("a", vec![Node::Text("a < b & c".into())]);
        el.set_attr("title", "say \"hi\"");
        assert_eq!(
            element_to_html(&el),
            r#"<a title="say &quot;hi&quot;">a &lt; b &amp; c</a>"#
        );
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let nodes = body(r#"<p>a<br>b<img src="x.png"></p>"#);
        let p = nodes[0].as_element().unwrap();
        assert_eq!(to_html(&p.children), r#"a<br>b<img src="x.png">"#);
    }

    #[test]
    fn comments_are_parsed_but_not_serialised() {
        let nodes = body("<p>a<!-- note -->b</p>");
        let p = nodes[0].as_element().unwrap();
        assert!(p.children.iter().any(|n| matches!(n, Node::Comment(_))));
        assert_eq!(to_html(&p.children), "ab");
    }

    #[test]
    fn attr_helpers() {
        let mut el = Element::new("span");
        el.set_attr("class", "underline smallcaps");
        assert!(el.has_class("underline"));
        assert!(!el.has_class("under"));
        el.set_attr("CLASS", "x");
        assert_eq!(el.attrs.len(), 1);
        assert_eq!(el.remove_attr("class").as_deref(), Some("x"));
        assert!(el.attr("class").is_none());
    }

    #[test]
    fn block_detection_looks_through_inline_wrappers() {
        let nodes = body("<span><p>x</p></span>");
        assert!(has_block_content(&nodes[0]));
        let nodes = body("<span><b>x</b></span>");
        assert!(!has_block_content(&nodes[0]));
    }
}
