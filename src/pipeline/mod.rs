//! Pipeline stages for DOCX-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different DOCX backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pandoc ──▶ dom ──▶ process ──────────────▶ markdown ──▶ postprocess
//! (bytes)   (HTML5 +   (tree)  tables · math · images   (+ toc)     (cleanup)
//!            media)            lists · styles · shapes
//! ```
//!
//! 1. [`input`]  — size and ZIP-magic checks, then stage the bytes as a file
//! 2. [`pandoc`] — the only stage with a child process; bounded by a deadline
//! 3. [`media`]  — index what pandoc extracted so references can be resolved
//! 4. [`dom`]    — parse the intermediate HTML into a closed, typed tree
//! 5. [`process`] — rewrite the substructures a generic transliteration
//!    would mangle, using [`tables`], [`math`], [`images`], [`lists`],
//!    [`styles`] and [`shapes`]
//! 6. [`markdown`] — tag-dispatched transliteration plus [`toc`]
//! 7. [`postprocess`] — deterministic whitespace rules
//!
//! Stages 4–7 are pure and CPU-bound; [`transform`] bundles them so the
//! orchestrator can run them in one `spawn_blocking` call.

pub mod dom;
pub mod images;
pub mod input;
pub mod lists;
pub mod markdown;
pub mod math;
pub mod media;
pub mod pandoc;
pub mod postprocess;
pub mod process;
pub mod shapes;
pub mod styles;
pub mod tables;
pub mod toc;

use crate::config::ConversionOptions;
use crate::error::ConversionWarning;
use crate::output::{ConversionStats, MediaEntry};
use markdown::AssembleOptions;
use math::MathRecord;
use media::MediaManifest;
use toc::HeadingEntry;

/// Everything the pure stages produce for one document.
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub markdown: String,
    pub headings: Vec<HeadingEntry>,
    pub media: Vec<MediaEntry>,
    pub warnings: Vec<ConversionWarning>,
    pub stats: ConversionStats,
    pub math: Vec<MathRecord>,
}

/// Parse, process and assemble one intermediate HTML document.
pub fn transform(
    html: &str,
    manifest: &MediaManifest,
    options: &ConversionOptions,
    flatten_blockquotes: bool,
) -> Transformed {
    let body = dom::parse_html(html).into_body();
    let tree = process::process(body, manifest, options);
    let assembled = markdown::assemble(&tree.nodes, &AssembleOptions::new(options, flatten_blockquotes));

    let mut stats = tree.stats;
    stats.headings = assembled.headings.len();
    stats.output_length = assembled.markdown.chars().count();

    Transformed {
        markdown: assembled.markdown,
        headings: assembled.headings,
        media: tree.media,
        warnings: tree.warnings,
        stats,
        math: tree.math,
    }
}
