//! Result types produced by a successful conversion.

use crate::error::ConversionWarning;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The outcome of converting one document.
///
/// Exists if and only if the owning task is `succeeded`. The Markdown has
/// already been written to [`ConversionResult::output_path`] together with
/// every file listed in [`ConversionResult::media`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Final Markdown text, byte-identical across repeated runs.
    pub markdown: String,

    /// Non-fatal issues, in the order they were found.
    pub warnings: Vec<ConversionWarning>,

    /// Byte length of `markdown`.
    pub byte_size: usize,

    /// Wall-clock time for the whole pipeline, in milliseconds.
    pub elapsed_ms: u64,

    /// Where the storage layer put the Markdown.
    pub output_path: PathBuf,

    /// Media files copied next to the Markdown.
    pub media: Vec<MediaEntry>,

    pub stats: ConversionStats,

    /// Per-step durations, in execution order.
    pub steps: Vec<StepTiming>,
}

/// One extracted media file and where it ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    /// The `src` the converter wrote into the HTML.
    pub original_reference: String,
    /// The `src` written into the Markdown, e.g. `./images/image1.png`.
    pub reference: String,
    /// Path under the document's output folder, e.g. `images/image1.png`.
    pub relative_path: String,
    /// Absolute path of the file in the scratch directory.
    #[serde(skip)]
    pub scratch_path: PathBuf,
    /// Where the storage layer wrote the copy; set during persistence.
    pub persisted_path: Option<PathBuf>,
}

impl MediaEntry {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// Counts of the structures the processor handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub tables: usize,
    pub math: usize,
    pub images: usize,
    pub shapes: usize,
    pub lists: usize,
    pub headings: usize,
    /// Character count of the final Markdown.
    pub output_length: usize,
}

/// Duration of one named pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub name: String,
    pub duration_ms: u64,
}

impl StepTiming {
    pub fn new(name: &str, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_file_name_is_last_segment() {
        let entry = MediaEntry {
            original_reference: "/tmp/x/media/sub/a.png".into(),
            reference: "./images/sub/a.png".into(),
            relative_path: "images/sub/a.png".into(),
            scratch_path: PathBuf::from("/tmp/x/media/sub/a.png"),
            persisted_path: None,
        };
        assert_eq!(entry.file_name(), "a.png");
    }

    #[test]
    fn scratch_path_is_not_serialised() {
        let entry = MediaEntry {
            original_reference: "media/a.png".into(),
            reference: "./images/a.png".into(),
            relative_path: "images/a.png".into(),
            scratch_path: PathBuf::from("/scratch/media/a.png"),
            persisted_path: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("/scratch"), "got: {json}");
    }
}
