//! Document storage: where sources come from and where results go.
//!
//! The pipeline only ever talks to [`Storage`]'s four operations, so a
//! different backend (object store, database blobs) can be dropped in without
//! touching the orchestrator. [`FsStorage`] is the local-directory backend
//! used by the CLI:
//!
//! ```text
//! <source_dir>/reports/q3.docx        ← read_source("reports/q3.docx")
//! <output_dir>/q3/q3.md               ← write_output("q3/q3.md", …)
//! <output_dir>/q3/images/image1.png   ← write_output("q3/images/image1.png", …)
//! ```

use crate::error::Docx2MdError;
use crate::request::normalise_id;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// The storage contract consumed by the orchestrator.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the raw bytes of a source document.
    async fn read_source(&self, id: &str) -> Result<Vec<u8>, Docx2MdError>;

    /// Write one output file and return where it landed.
    ///
    /// Existing files are overwritten; concurrent writers to the same id
    /// race and the last one wins.
    async fn write_output(&self, id: &str, bytes: &[u8]) -> Result<PathBuf, Docx2MdError>;

    /// Ids of every convertible source, sorted.
    async fn list_sources(&self) -> Result<Vec<String>, Docx2MdError>;

    /// Remove a source (and whatever was produced from it).
    /// Returns false when there was nothing to remove.
    async fn delete(&self, id: &str) -> Result<bool, Docx2MdError>;
}

/// Local-filesystem storage rooted at two directories.
#[derive(Debug, Clone)]
pub struct FsStorage {
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl FsStorage {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create both roots if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<(), Docx2MdError> {
        for dir in [&self.source_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Docx2MdError::OutputWriteFailed {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    fn source_path(&self, id: &str) -> Result<PathBuf, Docx2MdError> {
        Ok(self.source_dir.join(normalise_id(id)?))
    }

    fn output_path(&self, id: &str) -> Result<PathBuf, Docx2MdError> {
        Ok(self.output_dir.join(normalise_id(id)?))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read_source(&self, id: &str) -> Result<Vec<u8>, Docx2MdError> {
        let path = self.source_path(id)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            IoErrorKind::PermissionDenied => Docx2MdError::PermissionDenied { id: id.to_string() },
            _ => Docx2MdError::FileNotFound { id: id.to_string() },
        })
    }

    async fn write_output(&self, id: &str, bytes: &[u8]) -> Result<PathBuf, Docx2MdError> {
        let path = self.output_path(id)?;
        let write_failed = |source| Docx2MdError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        // Atomic write: each writer gets its own sibling temp file, so
        // concurrent writers only ever race on the final rename
        let tmp_path = temp_sibling(&path);
        tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_failed(e));
        }

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    async fn list_sources(&self) -> Result<Vec<String>, Docx2MdError> {
        let root = self.source_dir.clone();
        tokio::task::spawn_blocking(move || scan_sources(&root))
            .await
            .map_err(|e| Docx2MdError::Internal(format!("source scan panicked: {e}")))
    }

    async fn delete(&self, id: &str) -> Result<bool, Docx2MdError> {
        let source = self.source_path(id)?;
        let mut removed = false;

        match tokio::fs::remove_file(&source).await {
            Ok(()) => removed = true,
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => {
                return Err(Docx2MdError::OutputWriteFailed {
                    path: source,
                    source: e,
                })
            }
        }

        // The document's output folder is named after the source stem
        if let Some(stem) = source.file_stem() {
            let folder = self.output_dir.join(stem);
            match tokio::fs::remove_dir_all(&folder).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Docx2MdError::OutputWriteFailed {
                        path: folder,
                        source: e,
                    })
                }
            }
        }

        Ok(removed)
    }
}

/// `<dir>/.<name>.<uuid>.tmp`, unique per call.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Recursively collect `*.docx` ids below `root`, skipping Word lock files.
fn scan_sources(root: &Path) -> Vec<String> {
    let mut ids: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with("~$") && name.to_ascii_lowercase().ends_with(".docx")
        })
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    ids.sort();
    ids
}
