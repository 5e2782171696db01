//! Cancellation flags for active tasks.
//!
//! Every running task owns one flag. Callers request cancellation by id, and
//! the code doing the work polls the flag at its checkpoints through a
//! [`CancelToken`]. Nothing is ever interrupted preemptively: a cancellation
//! takes effect at the next checkpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Thread-safe map of task id to cancellation flag.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    flags: Arc<Mutex<HashMap<String, bool>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        // A poisoned map still holds valid booleans
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a task. Re-creating an existing id resets its flag.
    pub fn create(&self, task_id: &str) {
        self.lock().insert(task_id.to_string(), false);
        debug!(task_id, "task registered");
    }

    /// Register a task only if it is not already known, keeping any pending
    /// cancellation request intact.
    pub fn ensure(&self, task_id: &str) {
        self.lock().entry(task_id.to_string()).or_insert(false);
    }

    pub fn exists(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Ask a task to stop at its next checkpoint.
    ///
    /// Unknown ids are logged and ignored.
    pub fn request_cancel(&self, task_id: &str) {
        match self.lock().get_mut(task_id) {
            Some(flag) => {
                *flag = true;
                info!(task_id, "cancellation requested");
            }
            None => warn!(task_id, "cancellation requested for unknown task"),
        }
    }

    /// Returns false for unknown ids.
    pub fn is_cancelled(&self, task_id: &str) -> bool {
        self.lock().get(task_id).copied().unwrap_or(false)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested.
    pub fn assert_not_cancelled(&self, task_id: &str) -> Result<()> {
        if self.is_cancelled(task_id) {
            warn!(task_id, "cancellation detected at checkpoint");
            return Err(Error::Cancelled(task_id.to_string()));
        }
        Ok(())
    }

    pub fn remove(&self, task_id: &str) {
        if self.lock().remove(task_id).is_some() {
            debug!(task_id, "task removed");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
        info!("all tasks cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Handle bound to one task id, passed down to the code doing the work.
    pub fn token(&self, task_id: impl Into<String>) -> CancelToken {
        CancelToken {
            task_id: task_id.into(),
            registry: self.clone(),
        }
    }
}

/// Cancellation context for a single task.
#[derive(Debug, Clone)]
pub struct CancelToken {
    task_id: String,
    registry: TaskRegistry,
}

impl CancelToken {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(&self.task_id)
    }

    /// Checkpoint: fail with [`Error::Cancelled`] if the task should stop.
    pub fn check(&self) -> Result<()> {
        self.registry.assert_not_cancelled(&self.task_id)
    }
}

/// Generate a fresh task id.
pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
