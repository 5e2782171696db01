//! One-shot polishing of a transcript file.

use std::fs;

use anyhow::{Context, Result};
use collate_core::refine::{FailurePolicy, PolishMode};
use collate_core::settings::RefineSettings;
use collate_core::{Settings, TaskRegistry, clean_asr_text, new_task_id};

use crate::app;
use crate::args::PolishArgs;

/// Apply command-line overrides on top of saved settings
fn apply_overrides(settings: &mut RefineSettings, args: &PolishArgs) {
    if args.sequential {
        settings.mode = PolishMode::Sequential;
    }
    if let Some(n) = args.max_concurrency {
        settings.max_concurrency = n;
    }
    if let Some(n) = args.per_minute {
        settings.max_per_minute = n;
    }
    if args.split_limit.is_some() {
        settings.split_limit = args.split_limit;
    }
    if args.fail_hard {
        settings.on_failure = FailurePolicy::FailHard;
    }
}

pub async fn run(args: PolishArgs) -> Result<()> {
    let mut settings = Settings::load().refine;
    apply_overrides(&mut settings, &args);

    let refiner = app::build_refiner(&settings)?;

    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let text = clean_asr_text(&raw);

    // Ctrl-C stops dispatching new chunks
    let registry = TaskRegistry::new();
    let task_id = new_task_id();
    registry.create(&task_id);
    let cancel = registry.token(task_id.clone());
    let watcher = {
        let registry = registry.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                registry.request_cancel(&task_id);
            }
        })
    };

    app::print_status(" Polishing...");
    let result = refiner.polish(&text, Some(&cancel)).await;
    app::clear_status();
    watcher.abort();

    let outcome = result?;

    if args.debug {
        eprintln!("{}", outcome.debug_report());
    }
    if outcome.is_degraded() {
        eprintln!(
            "Warning: {} of {} chunk(s) kept their original text after retries",
            outcome.fallback_count(),
            outcome.chunks.len()
        );
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &outcome.text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved to {}", path.display());
        }
        None => println!("{}", outcome.text),
    }

    Ok(())
}
