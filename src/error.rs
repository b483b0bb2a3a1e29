//! Error types for the docx2md library.
//!
//! Three distinct types reflect three distinct failure modes:
//!
//! * [`Docx2MdError`] — **Fatal**: the document cannot be converted at all
//!   (missing source, pandoc crashed or timed out, output not writable).
//!   Returned as `Err(Docx2MdError)` from the orchestrator and recorded on a
//!   failed [`crate::task::ConversionTask`] as a [`TaskError`].
//!
//! * [`ConverterError`] — the typed outcome of the external pandoc process.
//!   Decided by process-exit semantics and a wall-clock deadline rather than
//!   by reading stderr, except for the narrow set of messages classified by
//!   [`FailureReason::classify`].
//!
//! * [`ConversionWarning`] — **Non-fatal**: one substructure degraded (one
//!   missing image, one malformed table, one math node without a TeX
//!   annotation). Accumulated on [`crate::output::ConversionResult`]; the
//!   document still completes with best-effort output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docx2md library.
///
/// Substructure-level problems use [`ConversionWarning`] and never reach
/// this type.
#[derive(Debug, Error)]
pub enum Docx2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The storage layer has no source document under this id.
    #[error("DOCX source not found: '{id}'\nCheck the name is relative to the source directory.")]
    FileNotFound { id: String },

    /// The storage layer refused to read the source.
    #[error("Permission denied reading '{id}'")]
    PermissionDenied { id: String },

    /// The source name does not carry a `.docx` extension.
    #[error("Unsupported format for '{name}': only .docx files are accepted")]
    UnsupportedFormat { name: String },

    /// The bytes were read but are not a ZIP container, so cannot be a DOCX.
    #[error("File is not a valid DOCX: '{id}'\nFirst bytes: {magic:?}")]
    NotADocx { id: String, magic: [u8; 4] },

    /// The source exceeds the configured maximum size.
    #[error("DOCX '{id}' is {size} bytes, above the {limit}-byte limit\nRaise --max-file-size to accept it.")]
    FileTooLarge { id: String, size: u64, limit: u64 },

    /// The identifier is empty, absolute, or escapes the storage root.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The external converter failed; see [`ConverterError`].
    #[error(transparent)]
    Converter(#[from] ConverterError),

    // ── Persistence errors ────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not copy an extracted media file into the output directory.
    #[error("Failed to copy media file '{path}': {source}")]
    MediaCopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Task errors ───────────────────────────────────────────────────────
    /// No task was ever created under this id.
    #[error("Task not found: '{id}'")]
    TaskNotFound { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker panic, runtime shut down).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Docx2MdError {
    /// The stable kind reported on failed tasks.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Docx2MdError::FileNotFound { .. }
            | Docx2MdError::PermissionDenied { .. }
            | Docx2MdError::UnsupportedFormat { .. }
            | Docx2MdError::NotADocx { .. }
            | Docx2MdError::FileTooLarge { .. }
            | Docx2MdError::InvalidInput { .. } => ErrorKind::Input,
            Docx2MdError::Converter(e) => e.kind(),
            Docx2MdError::OutputWriteFailed { .. } | Docx2MdError::MediaCopyFailed { .. } => {
                ErrorKind::Persistence
            }
            Docx2MdError::TaskNotFound { .. }
            | Docx2MdError::InvalidConfig(_)
            | Docx2MdError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Failure of the external pandoc process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConverterError {
    /// The process outlived its deadline and was killed.
    #[error("pandoc timed out after {secs}s and was terminated\nRaise --timeout for very large documents.")]
    Timeout { secs: u64 },

    /// The process exited with a failure status.
    #[error("pandoc exited with {}: {reason}\n{stderr}", exit_label(.code))]
    NonZeroExit {
        code: Option<i32>,
        stderr: String,
        reason: FailureReason,
    },

    /// The binary could not be found on `PATH` (or at the configured path).
    #[error("pandoc not found at '{program}'\nInstall it from https://pandoc.org/installing.html or pass --pandoc <PATH>.")]
    NotFound { program: String },

    /// The binary exists but could not be started.
    #[error("Failed to start '{program}': {detail}")]
    Spawn { program: String, detail: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

impl ConverterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConverterError::Timeout { .. } => ErrorKind::Timeout,
            ConverterError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ConverterError::NotFound { .. } => ErrorKind::NotFound,
            ConverterError::Spawn { .. } => ErrorKind::Internal,
        }
    }
}

/// Why pandoc rejected a document, as far as it can be told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The DOCX container or its XML could not be parsed.
    CorruptDocument,
    /// Anything not recognised below.
    #[default]
    Unknown,
}

/// pandoc's documented exit code for `PandocParseError`.
const PANDOC_PARSE_ERROR: i32 = 64;

/// The only stderr fragments inspected. Everything else is opaque.
const CORRUPT_DOCUMENT_MARKERS: &[&str] = &[
    "Did not find end of central directory signature",
    "Couldn't parse docx",
];

impl FailureReason {
    pub fn classify(code: Option<i32>, stderr: &str) -> Self {
        if code == Some(PANDOC_PARSE_ERROR)
            || CORRUPT_DOCUMENT_MARKERS.iter().any(|m| stderr.contains(m))
        {
            FailureReason::CorruptDocument
        } else {
            FailureReason::Unknown
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CorruptDocument => f.write_str("document is corrupt or not a DOCX"),
            FailureReason::Unknown => f.write_str("conversion failed"),
        }
    }
}

/// Stable error categories exposed to callers (and mapped to status codes
/// by whatever HTTP layer sits in front of the orchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Timeout,
    NonZeroExit,
    NotFound,
    Persistence,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Input => "input",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NonZeroExit => "non_zero_exit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The serialisable record of a fatal error, stored on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&Docx2MdError> for TaskError {
    fn from(e: &Docx2MdError) -> Self {
        Self {
            kind: e.kind(),
            detail: e.to_string(),
        }
    }
}

/// A non-fatal defect in one substructure of a document.
///
/// Indices (`table`, `node`, `shape`) are 1-based in document order so they
/// can be matched against what a reader sees.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// An image reference did not resolve to an extracted media file.
    #[error("image '{reference}' is missing from the extracted media; a placeholder was emitted")]
    MissingMedia { reference: String },

    /// A table was structurally odd but kept (or flattened to text).
    #[error("table {table}: {detail}")]
    MalformedTable { table: usize, detail: String },

    /// A math node had no TeX annotation under `latex` mode.
    #[error("math node {node}: {detail}")]
    UnresolvedMath { node: usize, detail: String },

    /// A drawing/shape container held nothing that could be kept.
    #[error("shape {shape}: {detail}")]
    UnsupportedShape { shape: usize, detail: String },

    /// pandoc succeeded but printed a warning.
    #[error("pandoc: {message}")]
    ConverterDiagnostic { message: String },

    /// The intermediate HTML was not valid UTF-8 and was decoded lossily.
    #[error("intermediate HTML is not valid UTF-8: {detail}")]
    InvalidUtf8 { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_share_a_kind() {
        let errs = [
            Docx2MdError::FileNotFound { id: "a.docx".into() },
            Docx2MdError::UnsupportedFormat { name: "a.pdf".into() },
            Docx2MdError::FileTooLarge {
                id: "a.docx".into(),
                size: 10,
                limit: 5,
            },
        ];
        for e in &errs {
            assert_eq!(e.kind(), ErrorKind::Input, "{e}");
        }
    }

    #[test]
    fn converter_kinds_pass_through() {
        let e: Docx2MdError = ConverterError::Timeout { secs: 3 }.into();
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert!(e.to_string().contains("3s"));

        let e: Docx2MdError = ConverterError::NotFound {
            program: "pandoc".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn non_zero_exit_display_includes_stderr() {
        let e = ConverterError::NonZeroExit {
            code: Some(1),
            stderr: "boom".into(),
            reason: FailureReason::Unknown,
        };
        let msg = e.to_string();
        assert!(msg.contains("status 1"), "got: {msg}");
        assert!(msg.contains("boom"), "got: {msg}");
    }

    #[test]
    fn failure_reason_recognises_only_known_markers() {
        assert_eq!(
            FailureReason::classify(Some(64), ""),
            FailureReason::CorruptDocument
        );
        assert_eq!(
            FailureReason::classify(
                Some(1),
                "Did not find end of central directory signature"
            ),
            FailureReason::CorruptDocument
        );
        assert_eq!(
            FailureReason::classify(Some(1), "something else entirely"),
            FailureReason::Unknown
        );
    }

    #[test]
    fn task_error_serialises_kind_in_snake_case() {
        let err = Docx2MdError::from(ConverterError::NonZeroExit {
            code: Some(2),
            stderr: String::new(),
            reason: FailureReason::Unknown,
        });
        let json = serde_json::to_string(&TaskError::from(&err)).unwrap();
        assert!(json.contains("\"non_zero_exit\""), "got: {json}");
    }

    #[test]
    fn warning_is_tagged() {
        let w = ConversionWarning::MissingMedia {
            reference: "media/image9.png".into(),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"kind\":\"missing_media\""), "got: {json}");
        assert!(w.to_string().contains("image9.png"));
    }
}
