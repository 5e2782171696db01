//! Status records callers poll while a task moves through the queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle of a task as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed and Cancelled are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of one task's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: TaskStatus,
    /// Human-readable progress or outcome
    pub message: String,
    /// Processor output, set on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error detail (cause chain) for failed tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    fn pending(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Pending,
            message: message.into(),
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// The terminal write for a task.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: TaskStatus,
    pub message: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn completed(message: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Completed,
            message: message.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            message: message.into(),
            result: None,
            error,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            message: message.into(),
            result: None,
            error: None,
        }
    }
}

/// Shared map of task id to [`StatusRecord`].
///
/// Owned by the hosting service and handed to the queue with each submission.
/// A record accepts exactly one terminal write; later attempts are ignored.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    records: Arc<Mutex<HashMap<String, StatusRecord>>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StatusRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking a task as `Pending`, replacing any earlier record.
    pub fn insert_pending(&self, task_id: &str, message: impl Into<String>) {
        self.lock()
            .insert(task_id.to_string(), StatusRecord::pending(message));
    }

    /// Read-only poll. `None` means the id is not tracked.
    pub fn get(&self, task_id: &str) -> Option<StatusRecord> {
        self.lock().get(task_id).cloned()
    }

    /// Move a non-terminal task to `Processing`.
    pub fn set_processing(&self, task_id: &str, message: impl Into<String>) -> bool {
        let mut records = self.lock();
        let record = records
            .entry(task_id.to_string())
            .or_insert_with(|| StatusRecord::pending(""));
        if record.status.is_terminal() {
            return false;
        }
        record.status = TaskStatus::Processing;
        record.message = message.into();
        true
    }

    /// Update the progress message of a non-terminal task.
    pub fn set_message(&self, task_id: &str, message: impl Into<String>) -> bool {
        match self.lock().get_mut(task_id) {
            Some(record) if !record.status.is_terminal() => {
                record.message = message.into();
                true
            }
            _ => false,
        }
    }

    /// Write the terminal state. Returns false if the task already finished.
    pub fn finish(&self, task_id: &str, outcome: Outcome) -> bool {
        debug_assert!(outcome.status.is_terminal());
        let mut records = self.lock();
        let record = records
            .entry(task_id.to_string())
            .or_insert_with(|| StatusRecord::pending(""));
        if record.status.is_terminal() {
            warn!(
                task_id,
                current = %record.status,
                ignored = %outcome.status,
                "task already finished"
            );
            return false;
        }
        record.status = outcome.status;
        record.message = outcome.message;
        record.result = outcome.result;
        record.error = outcome.error;
        record.completed_at = Some(Utc::now());
        true
    }

    pub fn remove(&self, task_id: &str) -> Option<StatusRecord> {
        self.lock().remove(task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_task_is_not_found() {
        let store = StatusStore::new();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_lifecycle() {
        let store = StatusStore::new();
        store.insert_pending("t", "queued");
        assert_eq!(store.get("t").unwrap().status, TaskStatus::Pending);

        assert!(store.set_processing("t", "working"));
        assert!(store.set_message("t", "polishing"));
        let record = store.get("t").unwrap();
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.message, "polishing");

        assert!(store.finish("t", Outcome::completed("done", serde_json::json!({"n": 1}))));
        let record = store.get("t").unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.result.unwrap()["n"], 1);
    }

    #[test]
    fn test_terminal_written_once() {
        let store = StatusStore::new();
        store.insert_pending("t", "queued");
        assert!(store.finish("t", Outcome::cancelled("stopped")));
        assert!(!store.finish("t", Outcome::failed("late", None)));
        assert!(!store.set_processing("t", "again"));
        assert!(!store.set_message("t", "again"));

        let record = store.get("t").unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.message, "stopped");
    }

    #[test]
    fn test_reinsert_after_remove() {
        let store = StatusStore::new();
        store.insert_pending("t", "queued");
        store.finish("t", Outcome::failed("boom", Some("trace".into())));
        store.remove("t");
        store.insert_pending("t", "queued again");
        assert_eq!(store.get("t").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
    }
}
