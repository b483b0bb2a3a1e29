//! Structural processor: rewrite the intermediate HTML tree so the generic
//! Markdown pass has nothing left it could mangle.
//!
//! ## Traversal order
//!
//! ```text
//!            pre-order                       post-order
//!   ┌──────────────────────────┐   ┌────────────────────────────────┐
//!   │ <math>, span.math  → math│   │ children first, then:          │
//!   │ shape / shape figure     │   │   <img>     → images           │
//!   │   → shapes (+ images)    │   │   <table>   → tables           │
//!   └──────────────────────────┘   │   <ul>/<ol> → lists            │
//!                                  │   <li>      → lists            │
//!                                  │   b/i/s/u…  → styles           │
//!                                  │   span/font → unwrapped        │
//!                                  └────────────────────────────────┘
//! ```
//!
//! Post-order guarantees cell contents (math, images) are final before a
//! table is serialised around them. Math and shapes are intercepted before
//! their children are visited because their children are not document
//! content in the usual sense.
//!
//! The processor does no I/O: media is only *resolved* against the manifest
//! here and copied by the orchestrator afterwards.

use super::dom::{Element, Node};
use super::images::ImageRewriter;
use super::math::{self, MathRecord};
use super::media::MediaManifest;
use super::styles::{self, StyleSet};
use super::{lists, shapes, tables};
use crate::config::ConversionOptions;
use crate::error::ConversionWarning;
use crate::output::{ConversionStats, MediaEntry};
use tracing::{debug, warn};

/// The processed document plus everything learned while processing it.
#[derive(Debug, Clone, Default)]
pub struct ProcessedTree {
    pub nodes: Vec<Node>,
    /// Media the output references, deduplicated, in first-use order.
    pub media: Vec<MediaEntry>,
    pub warnings: Vec<ConversionWarning>,
    pub stats: ConversionStats,
    pub math: Vec<MathRecord>,
}

/// What the traversal knows about a node's ancestors.
#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    in_table: bool,
    in_captioned_figure: bool,
    styles: StyleSet,
}

impl Ctx {
    fn enter(self, el: &Element) -> Self {
        let mut ctx = self;
        if el.is("table") {
            ctx.in_table = true;
        }
        if el.is("figure") && el.child_elements().any(|c| c.is("figcaption")) {
            ctx.in_captioned_figure = true;
        }
        if let Some(style) = styles::style_of(el) {
            ctx.styles = ctx.styles.with(style);
        }
        ctx
    }
}

/// Rewrite `nodes` (the document body) for Markdown assembly.
pub fn process(nodes: Vec<Node>, manifest: &MediaManifest, options: &ConversionOptions) -> ProcessedTree {
    let mut processor = Processor {
        options,
        images: ImageRewriter::new(manifest, options.preserve_images),
        warnings: Vec::new(),
        stats: ConversionStats::default(),
        math: Vec::new(),
    };
    let nodes = processor.nodes(nodes, Ctx::default());
    debug!(
        "Processed tree: {} tables, {} math, {} images, {} shapes, {} lists, {} warnings",
        processor.stats.tables,
        processor.stats.math,
        processor.stats.images,
        processor.stats.shapes,
        processor.stats.lists,
        processor.warnings.len()
    );
    ProcessedTree {
        nodes,
        media: processor.images.into_media(),
        warnings: processor.warnings,
        stats: processor.stats,
        math: processor.math,
    }
}

struct Processor<'a> {
    options: &'a ConversionOptions,
    images: ImageRewriter<'a>,
    warnings: Vec<ConversionWarning>,
    stats: ConversionStats,
    math: Vec<MathRecord>,
}

impl Processor<'_> {
    fn nodes(&mut self, nodes: Vec<Node>, ctx: Ctx) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element(el) => out.extend(self.element(el, ctx)),
                Node::Comment(_) => {}
                other => out.push(other),
            }
        }
        styles::merge_adjacent(out)
    }

    fn element(&mut self, el: Element, ctx: Ctx) -> Vec<Node> {
        // ── Pre-order interceptions ──
        if math::is_math(&el) {
            return self.math(el);
        }
        if shapes::is_shape_figure(&el) || shapes::is_shape(&el) {
            return self.shape(el, ctx);
        }

        // ── Children first ──
        let child_ctx = ctx.enter(&el);
        let Element {
            tag,
            attrs,
            children,
        } = el;
        let children = self.nodes(children, child_ctx);
        let el = Element {
            tag,
            attrs,
            children,
        };

        match el.tag.as_str() {
            "img" => self.image(el, ctx),
            "table" => self.table(el),
            "ul" | "ol" => {
                self.stats.lists += 1;
                vec![Node::Element(lists::normalise_list(el))]
            }
            "li" => vec![Node::Element(lists::normalise_item(el))],
            "span" | "font" => match styles::style_of(&el) {
                Some(style) => styles::normalise(el, style, ctx.styles),
                None => styles::unwrap(el),
            },
            _ => match styles::style_of(&el) {
                Some(style) => styles::normalise(el, style, ctx.styles),
                None => vec![Node::Element(el)],
            },
        }
    }

    // ── Math ─────────────────────────────────────────────────────────────

    fn math(&mut self, el: Element) -> Vec<Node> {
        self.stats.math += 1;
        let index = self.stats.math;
        let outcome = math::render(el, self.options.math_engine);
        if let Some(detail) = outcome.fallback {
            warn!("Math node {}: {}", index, detail);
            self.warnings
                .push(ConversionWarning::UnresolvedMath { node: index, detail });
        }
        self.math.push(outcome.record);
        outcome.nodes
    }

    // ── Tables ───────────────────────────────────────────────────────────

    fn table(&mut self, el: Element) -> Vec<Node> {
        self.stats.tables += 1;
        let index = self.stats.tables;
        let outcome = tables::render(el);
        if let Some(detail) = outcome.warning {
            warn!("Table {}: {}", index, detail);
            self.warnings
                .push(ConversionWarning::MalformedTable { table: index, detail });
        }
        outcome.nodes
    }

    // ── Images ───────────────────────────────────────────────────────────

    fn image(&mut self, el: Element, ctx: Ctx) -> Vec<Node> {
        self.stats.images += 1;
        let outcome = self
            .images
            .rewrite(el, ctx.in_captioned_figure, ctx.in_table);
        if let Some(reference) = outcome.missing {
            warn!("Image '{}' not found in extracted media", reference);
            self.warnings
                .push(ConversionWarning::MissingMedia { reference });
        }
        outcome.nodes
    }

    // ── Shapes ───────────────────────────────────────────────────────────

    fn shape(&mut self, el: Element, ctx: Ctx) -> Vec<Node> {
        self.stats.shapes += 1;
        let index = self.stats.shapes;
        let parts = shapes::extract(el);
        let mut out = parts.paragraphs();
        let extracted_nothing = parts.text.is_none() && parts.images.is_empty();

        let mut pictures = Vec::new();
        for img in parts.images {
            pictures.extend(self.image(img, ctx));
        }
        if !pictures.is_empty() {
            out.push(Node::Element(Element::with_children("p", pictures)));
        }

        if extracted_nothing {
            let detail = "no text or images could be extracted".to_string();
            warn!("Shape {}: {}", index, detail);
            self.warnings
                .push(ConversionWarning::UnsupportedShape { shape: index, detail });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MathEngine;
    use crate::pipeline::dom::{parse_html, to_html, Display, Rendered};
    use std::path::Path;

    fn run(html: &str, options: ConversionOptions) -> ProcessedTree {
        let manifest = MediaManifest::from_keys(Path::new("/s/extracted"), &["media/image1.png"]);
        process(parse_html(html).into_body(), &manifest, &options)
    }

    fn defaults() -> ConversionOptions {
        ConversionOptions::default()
    }

    #[test]
    fn math_inside_table_is_rendered_before_serialisation() {
        let html = r#"<table><tr><td><math display="inline"><semantics><mi>x</mi><annotation encoding="application/x-tex">x</annotation></semantics></math></td></tr></table>"#;
        let options = ConversionOptions {
            math_engine: MathEngine::Latex,
            ..defaults()
        };
        let tree = run(html, options);
        assert_eq!(tree.stats.tables, 1);
        assert_eq!(tree.stats.math, 1);
        match &tree.nodes[0] {
            Node::Rendered(Rendered { text, display }) => {
                assert_eq!(*display, Display::Block);
                assert!(text.contains("<td>$x$</td>"), "{text}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn image_inside_table_is_rewritten() {
        let html = r#"<table><tr><td><img src="media/image1.png"></td></tr></table>"#;
        let tree = run(html, defaults());
        let html = to_html(&tree.nodes);
        assert!(html.contains(r#"<img src="./images/image1.png">"#), "{html}");
        assert_eq!(tree.media.len(), 1);
    }

    #[test]
    fn missing_image_warns_and_keeps_going() {
        let tree = run(
            r#"<p><img src="media/image1.png"><img src="media/nope.png"></p>"#,
            defaults(),
        );
        assert_eq!(tree.stats.images, 2);
        assert_eq!(
            tree.warnings,
            vec![ConversionWarning::MissingMedia {
                reference: "media/nope.png".into()
            }]
        );
        assert!(to_html(&tree.nodes).contains("[missing image: nope.png]"));
    }

    #[test]
    fn captioned_figure_drops_image_when_not_preserved() {
        let options = ConversionOptions {
            preserve_images: false,
            ..defaults()
        };
        let tree = run(
            r#"<figure><img src="media/image1.png" alt="Chart"><figcaption>Chart</figcaption></figure>"#,
            options,
        );
        assert_eq!(
            to_html(&tree.nodes),
            "<figure><figcaption>Chart</figcaption></figure>"
        );
        assert!(tree.media.is_empty());
    }

    #[test]
    fn nested_styles_collapse() {
        let tree = run("<p><b>bold <strong>still</strong></b><i></i></p>", defaults());
        assert_eq!(to_html(&tree.nodes), "<p><strong>bold still</strong></p>");
    }

    #[test]
    fn spans_and_comments_disappear() {
        let tree = run(
            r#"<p><span id="_Toc1" class="anchor"></span><span class="smallcaps">Hi</span><!-- x --></p>"#,
            defaults(),
        );
        assert_eq!(to_html(&tree.nodes), "<p>Hi</p>");
    }

    #[test]
    fn shape_text_follows_caption() {
        let tree = run(
            r#"<figure><svg><text>Inside</text></svg><figcaption>Diagram</figcaption></figure>"#,
            defaults(),
        );
        assert_eq!(tree.stats.shapes, 1);
        assert_eq!(to_html(&tree.nodes), "<p>Diagram</p><p>Inside</p>");
        assert!(tree.warnings.is_empty());
    }

    #[test]
    fn empty_shape_warns() {
        let tree = run(r#"<div class="drawing"></div>"#, defaults());
        assert!(matches!(
            tree.warnings.as_slice(),
            [ConversionWarning::UnsupportedShape { shape: 1, .. }]
        ));
    }

    #[test]
    fn lists_are_counted_and_repaired() {
        let tree = run("<ul><li>a</li><ul><li>b</li></ul></ul>", defaults());
        assert_eq!(tree.stats.lists, 2);
        assert_eq!(
            to_html(&tree.nodes),
            "<ul><li><p>a</p><ul><li>b</li></ul></li></ul>"
        );
    }
}
