//! Process transcript files through the inference queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use collate_core::queue::{InferenceQueue, JobPayload, ProcessOptions};
use collate_core::{Settings, StatusStore, TaskRegistry, TaskStatus, new_task_id};
use tokio::runtime::Handle;

use crate::app;
use crate::args::RunArgs;
use crate::processor::TextFileProcessor;

pub async fn run(args: RunArgs) -> Result<()> {
    let settings = Settings::load();

    let refiner = if args.no_polish {
        None
    } else {
        Some(Arc::new(app::build_refiner(&settings.refine)?))
    };
    let processor = Arc::new(TextFileProcessor::new(refiner, Handle::current()));

    let registry = TaskRegistry::new();
    let statuses = StatusStore::new();
    let queue = InferenceQueue::new(settings.queue.capacity, processor, registry.clone())?;
    queue.start();

    let options = ProcessOptions {
        text_only: true,
        polish: !args.no_polish,
    };

    let mut tasks: Vec<(String, PathBuf)> = Vec::new();
    for file in &args.files {
        let task_id = new_task_id();
        statuses.insert_pending(&task_id, "queued");
        let payload = JobPayload::Upload {
            path: file.clone(),
            options: options.clone(),
            remove_after: false,
        };
        if let Err(e) = queue.submit(&task_id, payload, &statuses) {
            eprintln!("{}: {}", file.display(), e);
        }
        tasks.push((task_id, file.clone()));
    }

    let poll = Duration::from_millis(settings.queue.poll_interval_ms.max(10));
    let mut interval = tokio::time::interval(poll);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelling = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelling => {
                eprintln!("\nCancelling remaining jobs...");
                for (task_id, _) in &tasks {
                    if registry.exists(task_id) {
                        registry.request_cancel(task_id);
                        statuses.set_message(task_id, "cancellation requested");
                    }
                }
                cancelling = true;
            }
            _ = interval.tick() => {
                let done = tasks
                    .iter()
                    .filter(|(id, _)| statuses.get(id).is_some_and(|r| r.status.is_terminal()))
                    .count();
                app::print_status(&format!(" Processed {done}/{} file(s)", tasks.len()));
                if done == tasks.len() {
                    break;
                }
            }
        }
    }
    app::clear_status();
    queue.shutdown().await;

    let mut unfinished = 0;
    for (task_id, file) in &tasks {
        let Some(record) = statuses.get(task_id) else {
            continue;
        };
        let output = record
            .result
            .as_ref()
            .and_then(|r| r["output"]["output_file"].as_str())
            .unwrap_or("");
        match record.status {
            TaskStatus::Completed => {
                println!("{}: {} -> {}", file.display(), record.message, output)
            }
            status => {
                unfinished += 1;
                println!("{}: {} ({})", file.display(), status, record.message);
            }
        }
    }

    if unfinished > 0 {
        anyhow::bail!("{unfinished} of {} file(s) were not processed", tasks.len());
    }
    Ok(())
}
