//! Progress-callback trait for task lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves each document through its states.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a broadcast channel, a database row or a
//! terminal progress bar without the library knowing how the host
//! application communicates. Polling [`crate::Orchestrator::task_status`]
//! remains the source of truth; callbacks are notifications only.
//!
//! # Example
//!
//! ```rust
//! use docx2md::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_task_complete(&self, _task_id: &str, source: &str, _warnings: usize, _bytes: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {source} done");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as tasks change state.
///
/// Implementations must be `Send + Sync`: tasks of one batch run on
/// different workers and report concurrently. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once when a batch has been accepted.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks a task up (`queued → running`).
    fn on_task_start(&self, task_id: &str, source: &str) {
        let _ = (task_id, source);
    }

    /// Called when a task reaches `succeeded`.
    ///
    /// # Arguments
    /// * `warnings` — number of non-fatal warnings on the result
    /// * `bytes`    — byte length of the written Markdown
    fn on_task_complete(&self, task_id: &str, source: &str, warnings: usize, bytes: usize) {
        let _ = (task_id, source, warnings, bytes);
    }

    /// Called when a task reaches `failed`.
    fn on_task_error(&self, task_id: &str, source: &str, error: &str) {
        let _ = (task_id, source, error);
    }

    /// Called once after every task of a batch is terminal.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
