//! Conversion orchestrator: sequences the pipeline per document and tracks
//! every run as a [`ConversionTask`].
//!
//! ## One document, four steps
//!
//! ```text
//! validate ──▶ docx_to_html ──▶ html_to_markdown ──▶ persist
//! (read +      (pandoc,         (dom → process →      (media, then
//!  stage)       deadline)        markdown; blocking)   the .md file)
//! ```
//!
//! Steps are strictly sequential and each is timed into
//! [`ConversionResult::steps`]. Everything between `validate` and `persist`
//! happens inside a scratch directory owned by that one run; the directory
//! is a [`tempfile::TempDir`], so it is removed on every exit path,
//! including timeouts and errors, unless cleanup was disabled for debugging.
//!
//! ## Why a semaphore and not a fixed worker pool?
//!
//! `convert_one`, `convert_batch` and `convert_stream` may be used at the
//! same time from different callers. A single [`Semaphore`] sized to
//! `workers` bounds the number of live pandoc processes across all of them,
//! while each document still runs on its own tokio task.
//!
//! ## Task ownership
//!
//! A task is created `queued` before any work is scheduled, then owned by
//! exactly one worker, which is the only writer of its later transitions.
//! Pollers read cloned snapshots through [`Orchestrator::task_status`].

use crate::config::{ConversionConfig, ConversionOptions};
use crate::error::{ConversionWarning, Docx2MdError, TaskError};
use crate::output::{ConversionResult, MediaEntry, StepTiming};
use crate::pipeline::pandoc::{DocumentConverter, HtmlOutput, PandocConverter};
use crate::pipeline::{self, input, media::MediaManifest};
use crate::request::ConversionRequest;
use crate::storage::Storage;
use crate::task::{BatchSummary, ConversionTask, TaskStore, TransitionError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every per-document scratch directory.
pub const SCRATCH_PREFIX: &str = "docx2md-";

/// Drives conversions and owns the task registry.
///
/// Cheap to clone; clones share the same tasks, storage and worker limit.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: ConversionConfig,
    storage: Arc<dyn Storage>,
    converter: Arc<dyn DocumentConverter>,
    converter_version: String,
    tasks: TaskStore,
    permits: Arc<Semaphore>,
}

/// Result of [`Orchestrator::check_dependencies`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// First line of `pandoc --version`.
    pub converter_version: String,
    /// Whether the storage layer could list its sources.
    pub storage_ok: bool,
}

/// A submitted batch.
///
/// Task ids are known immediately; poll them with
/// [`Orchestrator::task_status`] or wait for all of them with
/// [`TaskHandle::join`].
#[derive(Debug)]
pub struct TaskHandle {
    pub batch_id: String,
    /// One id per request, in submission order.
    pub task_ids: Vec<String>,
    supervisor: JoinHandle<BatchSummary>,
}

impl TaskHandle {
    /// Wait until every task of the batch is terminal.
    pub async fn join(self) -> Result<BatchSummary, Docx2MdError> {
        self.supervisor
            .await
            .map_err(|e| Docx2MdError::Internal(format!("batch supervisor panicked: {e}")))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("converter_version", &self.inner.converter_version)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator backed by the configured pandoc executable.
    ///
    /// # Errors
    /// Fails fast with [`crate::error::ConverterError::NotFound`] when pandoc
    /// cannot be run, rather than failing every request later.
    pub async fn new(config: ConversionConfig, storage: Arc<dyn Storage>) -> Result<Self, Docx2MdError> {
        let converter = PandocConverter::new(config.converter_program.clone());
        Self::with_converter(config, storage, Arc::new(converter)).await
    }

    /// Build an orchestrator around any [`DocumentConverter`].
    pub async fn with_converter(
        config: ConversionConfig,
        storage: Arc<dyn Storage>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Result<Self, Docx2MdError> {
        let converter_version = converter.version().await?;
        info!(
            "Converter ready: {} ({} workers, {}s timeout)",
            converter_version, config.workers, config.converter_timeout_secs
        );
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                storage,
                converter,
                converter_version,
                tasks: TaskStore::new(),
                permits,
            }),
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.inner.config
    }

    pub fn converter_version(&self) -> &str {
        &self.inner.converter_version
    }

    /// Build a request using the configured defaults.
    pub fn request(&self, source: &str) -> Result<ConversionRequest, Docx2MdError> {
        ConversionRequest::new(source, self.inner.config.defaults)
    }

    /// Build a request with explicit options.
    pub fn request_with(
        &self,
        source: &str,
        options: ConversionOptions,
    ) -> Result<ConversionRequest, Docx2MdError> {
        ConversionRequest::new(source, options)
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Convert one document and wait for it.
    ///
    /// The run is tracked like any other task, so its id
    /// ([`ConversionRequest::id`]) can be polled afterwards.
    ///
    /// Dropping the returned future before it resolves fails the task
    /// (`internal`) rather than leaving it queued or running.
    pub async fn convert_one(&self, request: ConversionRequest) -> Result<ConversionResult, Docx2MdError> {
        self.inner.create_task(&request)?;
        self.inner.run_task(&request).await
    }

    /// Schedule one task per request and return immediately.
    ///
    /// Tasks run concurrently up to the worker limit and finish in any
    /// order. A failing task never affects the others.
    pub fn convert_batch(&self, requests: Vec<ConversionRequest>) -> Result<TaskHandle, Docx2MdError> {
        let batch_id = Uuid::new_v4().to_string();
        let task_ids = self.inner.create_tasks(&requests)?;
        let total = task_ids.len();
        info!("Batch {} accepted: {} documents", batch_id, total);
        if let Some(ref cb) = self.inner.config.progress_callback {
            cb.on_batch_start(total);
        }

        let workers: Vec<(String, JoinHandle<()>)> = requests
            .into_iter()
            .map(|request| {
                let inner = Arc::clone(&self.inner);
                let id = request.id().to_string();
                let handle = tokio::spawn(async move {
                    // Failures are recorded on the task itself
                    let _ = inner.run_task(&request).await;
                });
                (id, handle)
            })
            .collect();

        let inner = Arc::clone(&self.inner);
        let ids = task_ids.clone();
        let supervisor = tokio::spawn(async move {
            for (id, handle) in workers {
                if let Err(e) = handle.await {
                    warn!("Worker for task {} panicked: {}", id, e);
                    inner.abandon(&id, &format!("worker panicked: {e}"));
                }
            }
            let summary = inner.tasks.summarize(&ids);
            info!(
                "Batch complete: {}/{} succeeded, {} failed",
                summary.succeeded, summary.total, summary.failed
            );
            if let Some(ref cb) = inner.config.progress_callback {
                cb.on_batch_complete(summary.total, summary.succeeded);
            }
            summary
        });

        Ok(TaskHandle {
            batch_id,
            task_ids,
            supervisor,
        })
    }

    /// Snapshot of one task.
    pub fn task_status(&self, task_id: &str) -> Result<ConversionTask, Docx2MdError> {
        self.inner
            .tasks
            .get(task_id)
            .ok_or_else(|| Docx2MdError::TaskNotFound {
                id: task_id.to_string(),
            })
    }

    /// Snapshots of every task this orchestrator has seen, oldest first.
    pub fn tasks(&self) -> Vec<ConversionTask> {
        self.inner.tasks.list()
    }

    /// Forget a finished task, returning its final snapshot.
    ///
    /// # Errors
    /// [`Docx2MdError::TaskNotFound`] for unknown ids, and
    /// [`Docx2MdError::InvalidInput`] while the task is still queued or running.
    pub fn remove_task(&self, task_id: &str) -> Result<ConversionTask, Docx2MdError> {
        self.inner.tasks.remove(task_id).map_err(transition_error)
    }

    /// Forget every finished task. Long-lived orchestrators call this to
    /// release results that have already been collected.
    pub fn prune_finished(&self) -> usize {
        let removed = self.inner.tasks.prune_finished();
        debug!("Pruned {} finished tasks", removed);
        removed
    }

    pub fn batch_summary(&self, handle: &TaskHandle) -> BatchSummary {
        self.inner.tasks.summarize(&handle.task_ids)
    }

    /// Re-probe the converter and the storage layer.
    pub async fn check_dependencies(&self) -> Result<DependencyReport, Docx2MdError> {
        let converter_version = self.inner.converter.version().await?;
        let storage_ok = match self.inner.storage.list_sources().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Storage check failed: {}", e);
                false
            }
        };
        Ok(DependencyReport {
            converter_version,
            storage_ok,
        })
    }

    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

// ── Task lifecycle ───────────────────────────────────────────────────────

/// Fails its task on drop unless disarmed.
struct Unfinished<'a> {
    inner: &'a Inner,
    task_id: &'a str,
    armed: bool,
}

impl Drop for Unfinished<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Task {} cancelled before finishing", self.task_id);
            self.inner.abandon(self.task_id, "conversion cancelled");
        }
    }
}

impl Inner {
    pub(crate) fn create_task(&self, request: &ConversionRequest) -> Result<(), Docx2MdError> {
        self.tasks
            .create(request.id(), request.source())
            .map(|_| ())
            .map_err(transition_error)
    }

    /// Create every task before scheduling any, so a duplicate id rejects
    /// the whole batch instead of half of it.
    pub(crate) fn create_tasks(&self, requests: &[ConversionRequest]) -> Result<Vec<String>, Docx2MdError> {
        let mut seen = std::collections::HashSet::new();
        for request in requests {
            if !seen.insert(request.id()) || self.tasks.get(request.id()).is_some() {
                return Err(transition_error(TransitionError::Duplicate(
                    request.id().to_string(),
                )));
            }
        }
        for request in requests {
            self.create_task(request)?;
        }
        Ok(requests.iter().map(|r| r.id().to_string()).collect())
    }

    pub(crate) async fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit, Docx2MdError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| Docx2MdError::Internal(format!("worker pool closed: {e}")))
    }

    pub(crate) fn snapshot(&self, task_id: &str) -> Option<ConversionTask> {
        self.tasks.get(task_id)
    }

    /// Wait for a worker permit, then run one queued task.
    ///
    /// The task always ends terminal: if this future is dropped part way,
    /// the guard fails it on the way out.
    pub(crate) async fn run_task(&self, request: &ConversionRequest) -> Result<ConversionResult, Docx2MdError> {
        let mut guard = Unfinished {
            inner: self,
            task_id: request.id(),
            armed: true,
        };
        let outcome = match self.acquire().await {
            Ok(_permit) => self.execute(request).await,
            Err(e) => {
                self.abandon(request.id(), "worker pool closed");
                Err(e)
            }
        };
        guard.armed = false;
        outcome
    }

    /// Run one queued task to a terminal state.
    async fn execute(&self, request: &ConversionRequest) -> Result<ConversionResult, Docx2MdError> {
        let id = request.id();
        let source = &request.source().id;
        self.tasks.mark_running(id).map_err(transition_error)?;
        info!("Converting {} (task {})", source, id);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_task_start(id, source);
        }

        match self.run(request).await {
            Ok(result) => {
                info!(
                    "Converted {} in {}ms: {} bytes, {} warnings",
                    source,
                    result.elapsed_ms,
                    result.byte_size,
                    result.warnings.len()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_task_complete(id, source, result.warnings.len(), result.byte_size);
                }
                self.tasks
                    .mark_succeeded(id, result.clone())
                    .map_err(transition_error)?;
                Ok(result)
            }
            Err(e) => {
                warn!("Conversion of {} failed ({}): {}", source, e.kind(), e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_task_error(id, source, &e.to_string());
                }
                self.tasks
                    .mark_failed(id, TaskError::from(&e))
                    .map_err(transition_error)?;
                Err(e)
            }
        }
    }

    /// Force a task that lost its worker into `failed`.
    pub(crate) fn abandon(&self, task_id: &str, detail: &str) {
        let error = TaskError::from(&Docx2MdError::Internal(detail.to_string()));
        // Queued tasks must pass through running first
        let _ = self.tasks.mark_running(task_id);
        if let Err(e) = self.tasks.mark_failed(task_id, error) {
            debug!("Task {} already terminal: {}", task_id, e);
        }
    }

    // ── Pipeline ─────────────────────────────────────────────────────────

    async fn run(&self, request: &ConversionRequest) -> Result<ConversionResult, Docx2MdError> {
        let started = Instant::now();
        let scratch = self.scratch_dir().await?;
        debug!("Scratch directory {}", scratch.path().display());

        let outcome = self.steps(request, scratch.path(), started).await;

        if self.config.cleanup_temp_files {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        } else {
            let kept = scratch.keep();
            info!("Kept scratch directory {}", kept.display());
        }
        outcome
    }

    async fn steps(
        &self,
        request: &ConversionRequest,
        scratch: &Path,
        started: Instant,
    ) -> Result<ConversionResult, Docx2MdError> {
        let source = request.source();
        let options = *request.options();
        let mut steps = Vec::with_capacity(4);
        let mut warnings = Vec::new();

        // ── Step 1: Validate and stage the source ────────────────────────
        let t = Instant::now();
        let bytes = self.storage.read_source(&source.id).await?;
        let staged = input::stage_source(&source.id, &bytes, self.config.max_file_size, scratch).await?;
        drop(bytes);
        steps.push(timed("validate", t));

        // ── Step 2: DOCX → intermediate HTML ─────────────────────────────
        let t = Instant::now();
        let timeout = Duration::from_secs(self.config.converter_timeout_secs);
        let HtmlOutput {
            html_path,
            media_dir,
            diagnostics,
        } = self.converter.convert(&staged, scratch, timeout).await?;
        for message in diagnostics {
            warn!("pandoc warning for {}: {}", source.id, message);
            warnings.push(ConversionWarning::ConverterDiagnostic { message });
        }
        let raw = tokio::fs::read(&html_path)
            .await
            .map_err(|e| Docx2MdError::Internal(format!("cannot read {}: {e}", html_path.display())))?;
        let html = match String::from_utf8(raw) {
            Ok(html) => html,
            Err(e) => {
                let detail = e.utf8_error().to_string();
                warn!("Intermediate HTML of {} is not UTF-8: {}", source.id, detail);
                warnings.push(ConversionWarning::InvalidUtf8 { detail });
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        steps.push(timed("docx_to_html", t));

        // ── Step 3: HTML → Markdown (pure, CPU-bound) ────────────────────
        let t = Instant::now();
        let flatten = self.config.flatten_blockquotes;
        let transformed = tokio::task::spawn_blocking(move || {
            let manifest = MediaManifest::scan(&media_dir);
            pipeline::transform(&html, &manifest, &options, flatten)
        })
        .await
        .map_err(|e| Docx2MdError::Internal(format!("HTML processing panicked: {e}")))?;
        warnings.extend(transformed.warnings);
        steps.push(timed("html_to_markdown", t));

        // ── Step 4: Persist media, then the Markdown ─────────────────────
        let t = Instant::now();
        let media = self.persist_media(&source.stem, transformed.media).await?;
        let output_id = format!(
            "{stem}/{stem}.{ext}",
            stem = source.stem,
            ext = options.output_format.extension()
        );
        let markdown = transformed.markdown;
        let output_path = self.storage.write_output(&output_id, markdown.as_bytes()).await?;
        steps.push(timed("persist", t));

        Ok(ConversionResult {
            byte_size: markdown.len(),
            markdown,
            warnings,
            elapsed_ms: started.elapsed().as_millis() as u64,
            output_path,
            media,
            stats: transformed.stats,
            steps,
        })
    }

    /// Copy every referenced media file below `<stem>/`.
    async fn persist_media(&self, stem: &str, media: Vec<MediaEntry>) -> Result<Vec<MediaEntry>, Docx2MdError> {
        let mut persisted = Vec::with_capacity(media.len());
        for mut entry in media {
            let bytes = tokio::fs::read(&entry.scratch_path)
                .await
                .map_err(|source| Docx2MdError::MediaCopyFailed {
                    path: entry.scratch_path.clone(),
                    source,
                })?;
            let id = format!("{stem}/{}", entry.relative_path);
            let path = self
                .storage
                .write_output(&id, &bytes)
                .await
                .map_err(|e| match e {
                    Docx2MdError::OutputWriteFailed { path, source } => {
                        Docx2MdError::MediaCopyFailed { path, source }
                    }
                    other => other,
                })?;
            debug!("Copied {} to {}", entry.original_reference, path.display());
            entry.persisted_path = Some(path);
            persisted.push(entry);
        }
        Ok(persisted)
    }

    async fn scratch_dir(&self) -> Result<TempDir, Docx2MdError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.config.scratch_root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| scratch_error(root, e))?;
                builder.tempdir_in(root).map_err(|e| scratch_error(root, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| scratch_error(&std::env::temp_dir(), e))?,
        };
        Ok(dir)
    }
}

fn timed(name: &str, started: Instant) -> StepTiming {
    let step = StepTiming::new(name, started.elapsed().as_millis() as u64);
    debug!("Step {} took {}ms", step.name, step.duration_ms);
    step
}

fn scratch_error(root: &Path, e: std::io::Error) -> Docx2MdError {
    Docx2MdError::Internal(format!(
        "cannot create scratch directory in {}: {e}",
        root.display()
    ))
}

fn transition_error(e: TransitionError) -> Docx2MdError {
    match e {
        TransitionError::Unknown(id) => Docx2MdError::TaskNotFound { id },
        TransitionError::Active(id, status) => Docx2MdError::InvalidInput {
            input: id,
            reason: format!("task is still {status}"),
        },
        other => Docx2MdError::Internal(other.to_string()),
    }
}
