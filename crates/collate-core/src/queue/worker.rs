use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::job::{Job, JobPayload, Processor};
use crate::error::Error;
use crate::task::{CancelToken, Outcome, TaskRegistry};

/// Resolves once the queue has been told to stop.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // A dropped sender means the queue itself is gone
    let _ = stop.wait_for(|stopping| *stopping).await;
}

/// Run jobs one at a time until the queue stops or every sender is gone.
///
/// On stop the running job is asked to cancel and awaited, then every job
/// still waiting is finished as cancelled.
pub(super) async fn run(
    mut rx: mpsc::Receiver<Job>,
    processor: Arc<dyn Processor>,
    registry: TaskRegistry,
    mut stop: watch::Receiver<bool>,
) {
    info!("inference worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let Job {
            task_id,
            payload,
            statuses,
        } = job;
        let kind = payload.kind();
        info!(%task_id, %kind, remaining = rx.len(), "job started");

        registry.ensure(&task_id);
        if registry.is_cancelled(&task_id) {
            info!(%task_id, "job cancelled before start");
            statuses.finish(&task_id, Outcome::cancelled("cancelled"));
            registry.remove(&task_id);
            continue;
        }

        statuses.set_processing(&task_id, format!("processing {kind} job"));

        let started = Instant::now();
        let cancel = registry.token(task_id.clone());
        let execution = execute(processor.clone(), payload, cancel);
        tokio::pin!(execution);
        let outcome = tokio::select! {
            outcome = &mut execution => outcome,
            _ = stop_requested(&mut stop) => {
                info!(%task_id, "queue stopping, cancelling running job");
                registry.request_cancel(&task_id);
                execution.await
            }
        };
        info!(
            %task_id,
            status = %outcome.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );

        statuses.finish(&task_id, outcome);
        registry.remove(&task_id);
    }

    drain(&mut rx, &registry);
    info!("inference worker stopped");
}

/// Close the channel and finish every job still in it as cancelled.
pub(super) fn drain(rx: &mut mpsc::Receiver<Job>, registry: &TaskRegistry) {
    rx.close();
    let mut drained = 0;
    while let Ok(job) = rx.try_recv() {
        job.statuses
            .finish(&job.task_id, Outcome::cancelled("queue shut down"));
        registry.remove(&job.task_id);
        drained += 1;
    }
    if drained > 0 {
        info!(drained, "cancelled jobs left in the queue");
    }
}

/// Run one payload on the blocking pool and turn whatever comes back into
/// a terminal outcome. Never fails, so the loop always moves on.
async fn execute(processor: Arc<dyn Processor>, payload: JobPayload, cancel: CancelToken) -> Outcome {
    let payload = Arc::new(payload);
    let joined = {
        let payload = payload.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || payload.dispatch(processor.as_ref(), &cancel)).await
    };

    if let Some(path) = payload.disposable_input() {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "removed uploaded input"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove uploaded input"),
        }
    }

    let task_id = cancel.task_id();
    match joined {
        Ok(Ok(output)) => {
            if cancel.is_cancelled() {
                info!(task_id, "job cancelled after processing");
                return Outcome::cancelled("cancelled");
            }
            Outcome::completed(output.summary(), output.to_json())
        }
        Ok(Err(err)) => {
            if Error::cancelled_in(&err).is_some() {
                info!(task_id, "job cancelled during processing");
                return Outcome::cancelled("cancelled");
            }
            error!(task_id, error = %format!("{err:#}"), "job failed");
            Outcome::failed(format!("processing failed: {err}"), Some(format!("{err:?}")))
        }
        Err(join_err) => {
            error!(task_id, error = %join_err, "job panicked");
            Outcome::failed(
                "processing failed: processor panicked",
                Some(join_err.to_string()),
            )
        }
    }
}
