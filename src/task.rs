//! Task tracking: the `queued → running → succeeded | failed` state machine.
//!
//! ## Ownership
//!
//! A task is created by the orchestrator in `queued`, handed to exactly one
//! worker which moves it to `running` and then to a terminal state. The
//! [`TaskStore`] enforces the legal transitions, so a terminal task can never
//! be rewritten and no transition is applied twice. Readers only ever receive
//! cloned snapshots, never a reference into the live map.

use crate::error::TaskError;
use crate::output::ConversionResult;
use crate::request::SourceDocument;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a conversion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        })
    }
}

/// A snapshot of one tracked conversion.
///
/// `result` is `Some` exactly when `status` is `Succeeded`; `error` is
/// `Some` exactly when `status` is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub id: String,
    pub source: SourceDocument,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ConversionResult>,
    pub error: Option<TaskError>,
}

impl ConversionTask {
    fn queued(id: &str, source: &SourceDocument) -> Self {
        Self {
            id: id.to_string(),
            source: source.clone(),
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// A rejected state change. Indicates a bug in the caller, never bad input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("task '{0}' does not exist")]
    Unknown(String),
    #[error("task '{id}' cannot move from {from} to {to}")]
    Illegal {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task '{0}' already exists")]
    Duplicate(String),
    #[error("task '{0}' is still {1}")]
    Active(String, TaskStatus),
}

/// In-memory task registry.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, ConversionTask>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in `queued`.
    pub fn create(&self, id: &str, source: &SourceDocument) -> Result<ConversionTask, TransitionError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(id) {
            return Err(TransitionError::Duplicate(id.to_string()));
        }
        let task = ConversionTask::queued(id, source);
        tasks.insert(id.to_string(), task.clone());
        Ok(task)
    }

    pub fn mark_running(&self, id: &str) -> Result<(), TransitionError> {
        self.transition(id, TaskStatus::Running, |task| {
            task.started_at = Some(Utc::now());
        })
    }

    pub fn mark_succeeded(&self, id: &str, result: ConversionResult) -> Result<(), TransitionError> {
        self.transition(id, TaskStatus::Succeeded, |task| {
            task.completed_at = Some(Utc::now());
            task.result = Some(result);
        })
    }

    pub fn mark_failed(&self, id: &str, error: TaskError) -> Result<(), TransitionError> {
        self.transition(id, TaskStatus::Failed, |task| {
            task.completed_at = Some(Utc::now());
            task.error = Some(error);
        })
    }

    fn transition(
        &self,
        id: &str,
        to: TaskStatus,
        apply: impl FnOnce(&mut ConversionTask),
    ) -> Result<(), TransitionError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TransitionError::Unknown(id.to_string()))?;
        if !task.status.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                id: id.to_string(),
                from: task.status,
                to,
            });
        }
        task.status = to;
        apply(task);
        Ok(())
    }

    /// Snapshot of one task.
    pub fn get(&self, id: &str) -> Option<ConversionTask> {
        self.tasks.read().get(id).cloned()
    }

    /// Snapshots of every task, oldest first.
    pub fn list(&self) -> Vec<ConversionTask> {
        let mut all: Vec<ConversionTask> = self.tasks.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Forget a terminal task and return its final snapshot.
    ///
    /// Queued and running tasks still have an owner and cannot be removed.
    pub fn remove(&self, id: &str) -> Result<ConversionTask, TransitionError> {
        let mut tasks = self.tasks.write();
        let status = tasks
            .get(id)
            .map(|t| t.status)
            .ok_or_else(|| TransitionError::Unknown(id.to_string()))?;
        if !status.is_terminal() {
            return Err(TransitionError::Active(id.to_string(), status));
        }
        tasks
            .remove(id)
            .ok_or_else(|| TransitionError::Unknown(id.to_string()))
    }

    /// Drop every terminal task; returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|_, t| !t.status.is_terminal());
        before - tasks.len()
    }

    /// Status counts over a set of task ids. Unknown ids are ignored.
    pub fn summarize(&self, ids: &[String]) -> BatchSummary {
        let tasks = self.tasks.read();
        let mut summary = BatchSummary {
            total: ids.len(),
            ..Default::default()
        };
        for status in ids.iter().filter_map(|id| tasks.get(id).map(|t| t.status)) {
            match status {
                TaskStatus::Queued => summary.queued += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Aggregate view of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// True once every task of the batch is terminal.
    pub fn is_finished(&self) -> bool {
        self.succeeded + self.failed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn source() -> SourceDocument {
        SourceDocument::parse("a.docx").unwrap()
    }

    fn failure() -> TaskError {
        TaskError {
            kind: ErrorKind::Timeout,
            detail: "too slow".into(),
        }
    }

    #[test]
    fn legal_path_to_failed() {
        let store = TaskStore::new();
        store.create("t1", &source()).unwrap();
        store.mark_running("t1").unwrap();
        store.mark_failed("t1", failure()).unwrap();

        let task = store.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result.is_none());
        assert_eq!(task.error.unwrap().kind, ErrorKind::Timeout);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn queued_cannot_jump_to_terminal() {
        let store = TaskStore::new();
        store.create("t1", &source()).unwrap();
        let err = store.mark_failed("t1", failure()).unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }), "{err}");
        assert_eq!(store.get("t1").unwrap().status, TaskStatus::Queued);
    }

    #[test]
    fn terminal_states_are_final() {
        let store = TaskStore::new();
        store.create("t1", &source()).unwrap();
        store.mark_running("t1").unwrap();
        store.mark_failed("t1", failure()).unwrap();
        assert!(store.mark_running("t1").is_err());
        assert!(store.mark_failed("t1", failure()).is_err());
        assert_eq!(store.get("t1").unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn snapshots_are_detached() {
        let store = TaskStore::new();
        let snapshot = store.create("t1", &source()).unwrap();
        store.mark_running("t1").unwrap();
        assert_eq!(snapshot.status, TaskStatus::Queued);
        assert_eq!(store.get("t1").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn duplicate_and_unknown_ids_are_rejected() {
        let store = TaskStore::new();
        store.create("t1", &source()).unwrap();
        assert!(matches!(
            store.create("t1", &source()),
            Err(TransitionError::Duplicate(_))
        ));
        assert!(matches!(
            store.mark_running("nope"),
            Err(TransitionError::Unknown(_))
        ));
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn summary_counts_each_state() {
        let store = TaskStore::new();
        for id in ["a", "b", "c"] {
            store.create(id, &source()).unwrap();
        }
        store.mark_running("b").unwrap();
        store.mark_running("c").unwrap();
        store.mark_failed("c", failure()).unwrap();

        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let s = store.summarize(&ids);
        assert_eq!((s.total, s.queued, s.running, s.failed), (3, 1, 1, 1));
        assert!(!s.is_finished());
    }

    #[test]
    fn only_terminal_tasks_are_removed() {
        let store = TaskStore::new();
        for id in ["done", "busy", "waiting"] {
            store.create(id, &source()).unwrap();
        }
        store.mark_running("done").unwrap();
        store.mark_failed("done", failure()).unwrap();
        store.mark_running("busy").unwrap();

        assert!(matches!(
            store.remove("busy"),
            Err(TransitionError::Active(_, TaskStatus::Running))
        ));
        assert_eq!(store.remove("done").unwrap().status, TaskStatus::Failed);
        assert!(store.get("done").is_none());
        assert!(matches!(store.remove("done"), Err(TransitionError::Unknown(_))));
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn prune_keeps_unfinished_tasks() {
        let store = TaskStore::new();
        for id in ["a", "b", "c"] {
            store.create(id, &source()).unwrap();
            store.mark_running(id).unwrap();
        }
        store.mark_failed("a", failure()).unwrap();
        store.mark_failed("c", failure()).unwrap();

        assert_eq!(store.prune_finished(), 2);
        let left: Vec<String> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(left, ["b"]);
        assert_eq!(store.prune_finished(), 0);
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
    }
}
