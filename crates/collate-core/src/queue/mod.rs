//! Single-worker inference queue.
//!
//! Jobs are accepted without blocking the caller and executed strictly in
//! FIFO order by one worker task, so the processor (and whatever model it
//! drives) never sees two jobs at once. The processor itself runs on tokio's
//! blocking pool; the worker only waits for the next job or for the current
//! one to finish.
//!
//! ```ignore
//! let registry = TaskRegistry::new();
//! let statuses = StatusStore::new();
//! let queue = InferenceQueue::new(DEFAULT_CAPACITY, Arc::new(processor), registry.clone())?;
//! queue.start();
//!
//! let task_id = new_task_id();
//! statuses.insert_pending(&task_id, "queued");
//! queue.submit(&task_id, payload, &statuses)?;
//! ```

mod job;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use job::{JobKind, JobPayload, ProcessOptions, ProcessOutput, Processor};

use crate::error::{Error, Result};
use crate::task::{Outcome, StatusStore, TaskRegistry};
use job::Job;

/// Jobs that may wait before submissions are rejected.
pub const DEFAULT_CAPACITY: usize = 50;

pub struct InferenceQueue {
    sender: mpsc::Sender<Job>,
    receiver: Mutex<Option<mpsc::Receiver<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop: watch::Sender<bool>,
    processor: Arc<dyn Processor>,
    registry: TaskRegistry,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl InferenceQueue {
    /// Create a stopped queue. Jobs can be submitted before [`start`](Self::start).
    pub fn new(
        capacity: usize,
        processor: Arc<dyn Processor>,
        registry: TaskRegistry,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Configuration(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        let (sender, receiver) = mpsc::channel(capacity);
        let (stop, _) = watch::channel(false);
        Ok(Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            stop,
            processor,
            registry,
            capacity,
        })
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker owns the receiving end, so a queue can be started once.
    pub fn start(&self) {
        let Some(receiver) = lock(&self.receiver).take() else {
            warn!("inference queue already started");
            return;
        };
        let handle = tokio::spawn(worker::run(
            receiver,
            self.processor.clone(),
            self.registry.clone(),
            self.stop.subscribe(),
        ));
        *lock(&self.worker) = Some(handle);
    }

    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Stop the queue and wait for the worker to exit.
    ///
    /// The running job is asked to cancel and finishes at its next checkpoint.
    /// Jobs still waiting are marked `Cancelled`. Later submissions fail.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);

        // Never started: nobody else will drain the channel
        if let Some(mut receiver) = lock(&self.receiver).take() {
            worker::drain(&mut receiver, &self.registry);
        }

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "inference worker ended abnormally");
        }
        info!("inference queue stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.is_stopping()
            && lock(&self.worker)
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Enqueue a job without waiting.
    ///
    /// The caller sets the task `Pending` in `statuses` beforehand. If the queue
    /// is full the task is marked `Failed` right away and [`Error::QueueFull`]
    /// is returned.
    pub fn submit(&self, task_id: &str, payload: JobPayload, statuses: &StatusStore) -> Result<()> {
        // Registered now so a queued job can already be cancelled
        self.registry.ensure(task_id);

        if self.is_stopping() {
            error!(task_id, "queue is shut down, job rejected");
            self.reject(task_id, statuses, "queue is shut down", "worker stopped");
            return Err(Error::Processor("inference queue is shut down".to_string()));
        }

        let kind = payload.kind();
        let job = Job {
            task_id: task_id.to_string(),
            payload,
            statuses: statuses.clone(),
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                info!(task_id, %kind, queued = self.len(), "job submitted");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                error!(task_id, capacity = self.capacity, "queue full, job rejected");
                self.reject(task_id, statuses, "queue full, try again later", "queue is full");
                Err(Error::QueueFull {
                    task_id: task_id.to_string(),
                })
            }
            Err(TrySendError::Closed(_)) => {
                error!(task_id, "queue is shut down, job rejected");
                self.reject(task_id, statuses, "queue is shut down", "worker stopped");
                Err(Error::Processor("inference queue is shut down".to_string()))
            }
        }
    }

    fn reject(&self, task_id: &str, statuses: &StatusStore, message: &str, error: &str) {
        statuses.finish(task_id, Outcome::failed(message, Some(error.to_string())));
        self.registry.remove(task_id);
    }

    /// Jobs waiting to be picked up.
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for InferenceQueue {
    /// Same as [`shutdown`](Self::shutdown) without waiting: the worker
    /// finishes its current job in the background, then drains the rest.
    fn drop(&mut self) {
        self.stop.send_replace(true);
        if let Some(mut receiver) = lock(&self.receiver).take() {
            worker::drain(&mut receiver, &self.registry);
        }
    }
}
