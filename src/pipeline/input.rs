//! Input staging: validate source bytes and place them in the scratch dir.
//!
//! ## Why copy into the scratch directory?
//!
//! pandoc needs a file-system path, while the storage layer hands out bytes.
//! Writing the bytes into the per-task scratch directory gives pandoc a path
//! whose lifetime is tied to that directory, so the copy disappears with it
//! on every exit path. We check the ZIP magic (`PK\x03\x04`) first so
//! callers get an input error rather than an opaque pandoc failure.

use crate::error::Docx2MdError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local file header signature every DOCX (a ZIP container) starts with.
pub const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// File name the staged source gets inside the scratch directory.
pub const STAGED_SOURCE: &str = "source.docx";

/// Reject sources that are too large or are not ZIP containers.
pub fn validate_source(id: &str, bytes: &[u8], max_file_size: u64) -> Result<(), Docx2MdError> {
    let size = bytes.len() as u64;
    if size > max_file_size {
        return Err(Docx2MdError::FileTooLarge {
            id: id.to_string(),
            size,
            limit: max_file_size,
        });
    }

    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    if magic != ZIP_MAGIC {
        return Err(Docx2MdError::NotADocx {
            id: id.to_string(),
            magic,
        });
    }
    Ok(())
}

/// Validate `bytes` and write them to `<scratch>/source.docx`.
pub async fn stage_source(
    id: &str,
    bytes: &[u8],
    max_file_size: u64,
    scratch: &Path,
) -> Result<PathBuf, Docx2MdError> {
    validate_source(id, bytes, max_file_size)?;
    let path = scratch.join(STAGED_SOURCE);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Docx2MdError::Internal(format!("failed to stage '{id}': {e}")))?;
    debug!("Staged {} ({} bytes) at {}", id, bytes.len(), path.display());
    Ok(path)
}
