//! Configuration types for DOCX-to-Markdown conversion.
//!
//! Two layers of settings exist:
//!
//! * [`ConversionConfig`] — process-wide knobs (pandoc path, timeout, size
//!   limit, worker count, scratch handling). Built once via
//!   [`ConversionConfigBuilder`] and handed to the
//!   [`crate::orchestrator::Orchestrator`] at construction time; nothing in
//!   the pipeline reads environment variables afterwards.
//!
//! * [`ConversionOptions`] — per-document choices (TOC, math rendering,
//!   images). The config carries the defaults; each request may override any
//!   of them through [`crate::request::RequestOptions`].
//!
//! # Design choice: builder over constructor
//! Most callers only change one or two settings. The builder lets them set
//! those and rely on documented defaults for the rest, while `build()` is
//! the single place where invalid combinations are rejected.

use crate::error::Docx2MdError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default ceiling on accepted DOCX size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Configuration for the conversion orchestrator.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2md::{ConversionConfig, MathEngine};
///
/// let config = ConversionConfig::builder()
///     .converter_timeout_secs(120)
///     .workers(8)
///     .math_engine(MathEngine::Latex)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Path or name of the pandoc executable. Default: `pandoc` (looked up on `PATH`).
    pub converter_program: PathBuf,

    /// Wall-clock limit for one pandoc invocation, in seconds. Default: 300.
    ///
    /// When exceeded the process is killed and the task fails with
    /// [`crate::error::ErrorKind::Timeout`]; no partial HTML is processed.
    pub converter_timeout_secs: u64,

    /// Largest DOCX accepted, in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Maximum number of documents converted concurrently. Default: 4.
    ///
    /// Each worker owns one pandoc process at a time, so this is also the
    /// ceiling on concurrent child processes.
    pub workers: usize,

    /// Remove each per-document scratch directory when the run ends. Default: true.
    ///
    /// Turning this off leaves the intermediate HTML and extracted media on
    /// disk for debugging; the directory path is logged at `info` level.
    pub cleanup_temp_files: bool,

    /// Parent directory for scratch directories. Default: the system temp dir.
    pub scratch_root: Option<PathBuf>,

    /// Per-document options applied when a request does not override them.
    pub defaults: ConversionOptions,

    /// Render `<blockquote>` as plain paragraphs. Default: true.
    ///
    /// pandoc maps indented DOCX paragraphs to blockquotes, which almost never
    /// reflects an actual quotation in the source document.
    pub flatten_blockquotes: bool,

    /// Optional task lifecycle callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            converter_program: PathBuf::from("pandoc"),
            converter_timeout_secs: 300,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            workers: 4,
            cleanup_temp_files: true,
            scratch_root: None,
            defaults: ConversionOptions::default(),
            flatten_blockquotes: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("converter_program", &self.converter_program)
            .field("converter_timeout_secs", &self.converter_timeout_secs)
            .field("max_file_size", &self.max_file_size)
            .field("workers", &self.workers)
            .field("cleanup_temp_files", &self.cleanup_temp_files)
            .field("scratch_root", &self.scratch_root)
            .field("defaults", &self.defaults)
            .field("flatten_blockquotes", &self.flatten_blockquotes)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn converter_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs.max(1);
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn cleanup_temp_files(mut self, v: bool) -> Self {
        self.config.cleanup_temp_files = v;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn defaults(mut self, options: ConversionOptions) -> Self {
        self.config.defaults = options;
        self
    }

    pub fn preserve_images(mut self, v: bool) -> Self {
        self.config.defaults.preserve_images = v;
        self
    }

    pub fn include_toc(mut self, v: bool) -> Self {
        self.config.defaults.include_toc = v;
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.defaults.toc_depth = depth.clamp(MIN_TOC_DEPTH, MAX_TOC_DEPTH);
        self
    }

    pub fn math_engine(mut self, engine: MathEngine) -> Self {
        self.config.defaults.math_engine = engine;
        self
    }

    pub fn flatten_blockquotes(mut self, v: bool) -> Self {
        self.config.flatten_blockquotes = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Docx2MdError> {
        let c = &self.config;
        if c.converter_program.as_os_str().is_empty() {
            return Err(Docx2MdError::InvalidConfig(
                "converter program must not be empty".into(),
            ));
        }
        if c.max_file_size == 0 {
            return Err(Docx2MdError::InvalidConfig(
                "max file size must be ≥ 1 byte".into(),
            ));
        }
        if c.workers == 0 {
            return Err(Docx2MdError::InvalidConfig("workers must be ≥ 1".into()));
        }
        c.defaults.validate()?;
        Ok(self.config)
    }
}

// ── Per-document options ─────────────────────────────────────────────────

pub const MIN_TOC_DEPTH: u8 = 1;
pub const MAX_TOC_DEPTH: u8 = 6;

/// What one document's Markdown should look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Copy images next to the Markdown and link them. Default: true.
    ///
    /// When false, images are replaced by their caption text (if any) and no
    /// media file is written.
    pub preserve_images: bool,

    /// Prepend a table of contents. Default: true.
    pub include_toc: bool,

    /// Deepest heading level listed in the TOC, 1–6. Default: 4.
    ///
    /// Ignored when `include_toc` is false.
    pub toc_depth: u8,

    /// How math is written. Default: [`MathEngine::Mathml`].
    pub math_engine: MathEngine,

    /// Output format. Only Markdown exists today.
    pub output_format: OutputFormat,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            preserve_images: true,
            include_toc: true,
            toc_depth: 4,
            math_engine: MathEngine::default(),
            output_format: OutputFormat::default(),
        }
    }
}

impl ConversionOptions {
    pub fn validate(&self) -> Result<(), Docx2MdError> {
        if !(MIN_TOC_DEPTH..=MAX_TOC_DEPTH).contains(&self.toc_depth) {
            return Err(Docx2MdError::InvalidConfig(format!(
                "TOC depth must be {MIN_TOC_DEPTH}–{MAX_TOC_DEPTH}, got {}",
                self.toc_depth
            )));
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Rendering of `<math>` nodes in the Markdown output.
///
/// | Engine | Output | Use case |
/// |--------|--------|----------|
/// | `mathml` | the MathML subtree as inline HTML | renderers with MathML support (default) |
/// | `latex`  | `$…$` / `$$…$$` from the TeX annotation | MathJax / KaTeX sites |
/// | `plain`  | best-effort text | search indexing, degraded fallback |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathEngine {
    #[default]
    Mathml,
    Latex,
    Plain,
}

impl fmt::Display for MathEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MathEngine::Mathml => "mathml",
            MathEngine::Latex => "latex",
            MathEngine::Plain => "plain",
        })
    }
}

impl std::str::FromStr for MathEngine {
    type Err = Docx2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mathml" => Ok(MathEngine::Mathml),
            "latex" | "tex" => Ok(MathEngine::Latex),
            "plain" | "text" => Ok(MathEngine::Plain),
            other => Err(Docx2MdError::InvalidConfig(format!(
                "unknown math engine '{other}' (expected mathml, latex or plain)"
            ))),
        }
    }
}

/// Output format. Reserved for future formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
        }
    }
}
