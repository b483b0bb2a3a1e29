//! Image references: extraction path → `./images/…`.
//!
//! Every `src` that resolves against the [`MediaManifest`] is rewritten to
//! the document-relative path and recorded as a [`MediaEntry`]; the
//! orchestrator later copies exactly those entries, so the output can only
//! reference files that were persisted. A reference that resolves to
//! nothing becomes a visible placeholder instead of a dangling link.

use super::dom::{Element, Node, Rendered};
use super::media::{is_external, MediaManifest};
use crate::output::MediaEntry;

/// Folder (next to the Markdown file) images are copied into.
pub const IMAGES_DIR: &str = "images";

/// What became of one `<img>`.
#[derive(Debug)]
pub struct ImageOutcome {
    pub nodes: Vec<Node>,
    /// Set when the reference did not resolve.
    pub missing: Option<String>,
}

/// Rewrites images against one conversion's media manifest.
#[derive(Debug)]
pub struct ImageRewriter<'a> {
    manifest: &'a MediaManifest,
    preserve: bool,
    media: Vec<MediaEntry>,
}

impl<'a> ImageRewriter<'a> {
    pub fn new(manifest: &'a MediaManifest, preserve: bool) -> Self {
        Self {
            manifest,
            preserve,
            media: Vec::new(),
        }
    }

    /// `in_captioned_figure` drops the image entirely when images are not
    /// kept, since the figure's caption already carries its text.
    pub fn rewrite(&mut self, img: Element, in_captioned_figure: bool, in_table: bool) -> ImageOutcome {
        if !self.preserve {
            let nodes = if in_captioned_figure {
                Vec::new()
            } else {
                replacement_text(&img)
                    .map(|t| vec![Node::Text(t)])
                    .unwrap_or_default()
            };
            return ImageOutcome {
                nodes,
                missing: None,
            };
        }

        let reference = img.attr("src").unwrap_or_default().trim().to_string();
        if !reference.is_empty() && is_external(&reference) {
            return ImageOutcome {
                nodes: vec![Node::Element(img)],
                missing: None,
            };
        }

        let Some(file) = self.manifest.resolve(&reference) else {
            return ImageOutcome {
                nodes: vec![placeholder(&reference, in_table)],
                missing: Some(reference),
            };
        };

        let relative_path = format!("{IMAGES_DIR}/{}", file.output_name());
        let new_reference = format!("./{relative_path}");
        if !self.media.iter().any(|m| m.relative_path == relative_path) {
            self.media.push(MediaEntry {
                original_reference: reference,
                reference: new_reference.clone(),
                relative_path,
                scratch_path: file.path.clone(),
                persisted_path: None,
            });
        }

        let mut img = img;
        img.set_attr("src", new_reference);
        // Word sizes images in inches; the Markdown renderer decides instead
        img.remove_attr("style");
        ImageOutcome {
            nodes: vec![Node::Element(img)],
            missing: None,
        }
    }

    /// Media registered so far, in first-reference order, deduplicated.
    pub fn into_media(self) -> Vec<MediaEntry> {
        self.media
    }
}

fn replacement_text(img: &Element) -> Option<String> {
    ["alt", "title"]
        .iter()
        .filter_map(|name| img.attr(name))
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

fn placeholder(reference: &str, in_table: bool) -> Node {
    let name = reference
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("image");
    if in_table {
        Rendered::inline(format!("<em>[missing image: {name}]</em>"))
    } else {
        Rendered::inline(format!("*[missing image: {name}]*"))
    }
}
