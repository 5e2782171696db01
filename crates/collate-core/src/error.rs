//! Error taxonomy shared by the queue, the registry and the refiner.

use thiserror::Error;

/// Errors surfaced by collate's task engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Submission rejected because the queue is at capacity.
    #[error("queue full: task {task_id} was not accepted")]
    QueueFull { task_id: String },

    /// Cooperative cancellation signal for a task.
    #[error("task {0} was cancelled")]
    Cancelled(String),

    /// Refine call for one chunk kept failing after every attempt.
    #[error("chunk {index} failed after {attempts} attempt(s): {message}")]
    TransientRefine {
        index: usize,
        attempts: u32,
        message: String,
    },

    /// Anything else a job's processor reported.
    #[error("processor error: {0}")]
    Processor(String),

    /// Invalid settings, caught before any external call is made.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Returns true if this error is a cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Find a cancellation signal anywhere in an `anyhow` error chain.
    ///
    /// Processors report failures as `anyhow::Error`, so a `Cancelled` raised at a
    /// checkpoint may arrive wrapped in context.
    pub fn cancelled_in(err: &anyhow::Error) -> Option<&str> {
        err.chain().find_map(|cause| match cause.downcast_ref::<Error>() {
            Some(Error::Cancelled(task_id)) => Some(task_id.as_str()),
            _ => None,
        })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cancelled_found_through_context() {
        let err: anyhow::Result<()> = Err(Error::Cancelled("abc".into())).context("polishing");
        let err = err.unwrap_err();
        assert_eq!(Error::cancelled_in(&err), Some("abc"));
    }

    #[test]
    fn test_other_errors_are_not_cancellation() {
        let err = anyhow::anyhow!("disk full");
        assert_eq!(Error::cancelled_in(&err), None);
        assert!(!Error::Processor("x".into()).is_cancelled());
    }

    #[test]
    fn test_queue_full_message() {
        let err = Error::QueueFull {
            task_id: "t1".into(),
        };
        assert!(err.to_string().contains("queue full"));
    }
}
