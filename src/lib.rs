//! # docx2md
//!
//! Convert DOCX documents to Markdown without losing tables, math or images.
//!
//! ## Why this crate?
//!
//! Running `pandoc -t markdown` directly flattens merged table cells, drops
//! text that lives inside drawing canvases, and writes image links that
//! point into a temporary extraction directory. Instead this crate asks
//! pandoc for HTML5 (with MathML and extracted media), then rewrites the
//! HTML tree itself: tables stay as embedded HTML, math is rendered the way
//! you choose, images are copied next to the Markdown and relinked, and
//! shape text is pulled out into ordinary paragraphs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Validate  size limit + ZIP magic, staged into a private scratch dir
//!  ├─ 2. pandoc    DOCX → HTML5 + media (child process, hard deadline)
//!  ├─ 3. Process   tables · math · images · lists · styles · shapes
//!  ├─ 4. Assemble  tag-dispatched HTML → Markdown, TOC, whitespace rules
//!  └─ 5. Persist   <stem>/<stem>.md + <stem>/images/…
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2md::{ConversionConfig, FsStorage, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(FsStorage::new("docx", "markdown"));
//!     let orchestrator = Orchestrator::new(ConversionConfig::default(), storage).await?;
//!
//!     let request = orchestrator.request("report.docx")?;
//!     let result = orchestrator.convert_one(request).await?;
//!     println!("{}", result.markdown);
//!     for warning in &result.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docx2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Math Engines
//!
//! | Engine | Inline output | Needs |
//! |--------|---------------|-------|
//! | `mathml` | `<math>…</math>` | a renderer with MathML support (default) |
//! | `latex`  | `$E = mc^{2}$` | MathJax / KaTeX |
//! | `plain`  | `E=mc2` | nothing; lossy |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod storage;
pub mod stream;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionOptions, MathEngine, OutputFormat};
pub use error::{ConversionWarning, ConverterError, Docx2MdError, ErrorKind, TaskError};
pub use orchestrator::{DependencyReport, Orchestrator, TaskHandle};
pub use output::{ConversionResult, ConversionStats, MediaEntry, StepTiming};
pub use pipeline::pandoc::{DocumentConverter, PandocConverter};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{ConversionRequest, RequestOptions, SourceDocument};
pub use storage::{FsStorage, Storage};
pub use stream::TaskStream;
pub use task::{BatchSummary, ConversionTask, TaskStatus};
