//! Job queue settings.

use serde::{Deserialize, Serialize};

/// Settings for the inference queue and the clients polling it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Jobs that may wait in the queue before submissions are rejected
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How often clients poll task status, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_capacity() -> usize {
    crate::queue::DEFAULT_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
