//! Streaming batch API: emit tasks as they finish.
//!
//! ## Why stream?
//!
//! A directory of documents can take minutes. A stream lets callers print
//! or upload each result the moment it is ready instead of polling every
//! task id after [`crate::Orchestrator::convert_batch`].
//!
//! Items are final [`ConversionTask`] snapshots (always `succeeded` or
//! `failed`) in completion order, not submission order. Match them to
//! requests by `task.id` if order matters.

use crate::error::Docx2MdError;
use crate::orchestrator::{Inner, Orchestrator};
use crate::request::ConversionRequest;
use crate::task::ConversionTask;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of terminal task snapshots.
pub type TaskStream = Pin<Box<dyn Stream<Item = ConversionTask> + Send>>;

/// Owned by the stream; fails every task still unfinished when it is dropped.
struct PendingTasks {
    inner: Arc<Inner>,
    ids: Vec<String>,
}

impl Drop for PendingTasks {
    fn drop(&mut self) {
        for id in &self.ids {
            if self.inner.snapshot(id).is_some_and(|t| !t.status.is_terminal()) {
                self.inner.abandon(id, "stream dropped before the task ran");
            }
        }
    }
}

impl Orchestrator {
    /// Convert `requests`, yielding each task once it is terminal.
    ///
    /// At most `workers` documents are in flight; the stream must be polled
    /// for work to progress.
    ///
    /// # Errors
    /// Fails before yielding anything if a task id is already in use.
    pub fn convert_stream(&self, requests: Vec<ConversionRequest>) -> Result<TaskStream, Docx2MdError> {
        let inner = Arc::clone(self.inner());
        let pending = PendingTasks {
            inner: Arc::clone(&inner),
            ids: inner.create_tasks(&requests)?,
        };

        let total = requests.len();
        let concurrency = self.config().workers.max(1);
        info!("Streaming {} documents ({} at a time)", total, concurrency);
        if let Some(ref cb) = self.config().progress_callback {
            cb.on_batch_start(total);
        }

        let s = stream::iter(requests.into_iter().map(move |request| {
            let inner = Arc::clone(&inner);
            async move {
                // The outcome is recorded on the task
                if let Err(e) = inner.run_task(&request).await {
                    debug!("Task {} failed: {}", request.id(), e);
                }
                inner.snapshot(request.id())
            }
        }))
        .buffer_unordered(concurrency)
        .filter_map(move |task| {
            let _owned = &pending;
            async move { task }
        });

        Ok(Box::pin(s))
    }
}
