//! Conversion requests: what to convert and how.
//!
//! A [`ConversionRequest`] is immutable once created. Its source name is
//! validated up front (extension, path shape) so an obviously bad request is
//! rejected as an input error before any task exists.

use crate::config::{ConversionOptions, MathEngine, OutputFormat, MAX_TOC_DEPTH, MIN_TOC_DEPTH};
use crate::error::Docx2MdError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use uuid::Uuid;

/// Identity of a source document in the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Storage id, a `/`-separated path relative to the source root.
    pub id: String,
    /// File stem; names the output folder and Markdown file.
    pub stem: String,
}

impl SourceDocument {
    /// Validate and normalise a storage id such as `reports/q3.docx`.
    pub fn parse(name: &str) -> Result<Self, Docx2MdError> {
        let id = normalise_id(name)?;
        let path = Path::new(&id);
        let is_docx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"));
        if !is_docx {
            return Err(Docx2MdError::UnsupportedFormat { name: id });
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Docx2MdError::InvalidInput {
                input: id.clone(),
                reason: "file name has no stem".into(),
            })?
            .to_string();
        Ok(Self { id, stem })
    }
}

/// Reject empty, absolute and parent-escaping ids; normalise separators.
pub(crate) fn normalise_id(name: &str) -> Result<String, Docx2MdError> {
    let invalid = |reason: &str| Docx2MdError::InvalidInput {
        input: name.to_string(),
        reason: reason.to_string(),
    };
    let unified = name.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(invalid("empty name"));
    }
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or_else(|| invalid("name is not UTF-8"))?)
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("'..' is not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("absolute paths are not allowed"))
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid("empty name"));
    }
    Ok(parts.join("/"))
}

/// Per-request overrides. Absent fields fall back to the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub preserve_images: Option<bool>,
    pub include_toc: Option<bool>,
    pub toc_depth: Option<u8>,
    pub math_engine: Option<MathEngine>,
    pub output_format: Option<OutputFormat>,
}

impl RequestOptions {
    pub fn resolve(&self, defaults: &ConversionOptions) -> ConversionOptions {
        ConversionOptions {
            preserve_images: self.preserve_images.unwrap_or(defaults.preserve_images),
            include_toc: self.include_toc.unwrap_or(defaults.include_toc),
            toc_depth: self
                .toc_depth
                .map(|d| d.clamp(MIN_TOC_DEPTH, MAX_TOC_DEPTH))
                .unwrap_or(defaults.toc_depth),
            math_engine: self.math_engine.unwrap_or(defaults.math_engine),
            output_format: self.output_format.unwrap_or(defaults.output_format),
        }
    }
}

/// One document to convert, with fully resolved options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    id: String,
    source: SourceDocument,
    options: ConversionOptions,
}

impl ConversionRequest {
    /// Create a request with a fresh conversion id.
    ///
    /// # Errors
    /// [`Docx2MdError::UnsupportedFormat`] or [`Docx2MdError::InvalidInput`]
    /// when `source` is not a plausible DOCX storage id, or
    /// [`Docx2MdError::InvalidConfig`] when `options` are out of range.
    pub fn new(source: &str, options: ConversionOptions) -> Result<Self, Docx2MdError> {
        options.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source: SourceDocument::parse(source)?,
            options,
        })
    }

    /// The requester-visible conversion id; also the task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }
}
