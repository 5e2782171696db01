//! Task tracking: cancellation flags and the status records callers poll.

mod registry;
mod status;

pub use registry::{CancelToken, TaskRegistry, new_task_id};
pub use status::{Outcome, StatusRecord, StatusStore, TaskStatus};
