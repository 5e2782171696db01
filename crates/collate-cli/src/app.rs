use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use collate_core::refine::{ChatRefiner, ConcurrentRefiner};
use collate_core::settings::RefineSettings;

/// Build the chunked refiner from settings, or explain how to configure it.
pub fn build_refiner(settings: &RefineSettings) -> Result<ConcurrentRefiner> {
    let provider = settings.provider;
    if !settings.is_configured() {
        eprintln!("Error: No {} API key configured.", provider.display_name());
        eprintln!("\nSet your key with:");
        eprintln!("  collate config --provider {} --api-key YOUR_KEY\n", provider.as_str());
        eprintln!(
            "Or set the {} environment variable.",
            provider.api_key_env_var()
        );
        eprintln!("To run without a key, use a local model: collate config --provider ollama");
        std::process::exit(1);
    }

    let chat = ChatRefiner::from_settings(settings)?;
    let model = chat.model().to_string();
    let refiner = ConcurrentRefiner::new(Arc::new(chat), settings.polish_config());
    let config = refiner.config();
    tracing::debug!(
        provider = %provider,
        model = %model,
        split_limit = config.split_limit,
        max_concurrency = config.max_concurrency,
        max_per_minute = config.max_per_minute,
        "refiner ready"
    );
    Ok(refiner)
}

/// Print a status line to stderr, keeping stdout for results
pub fn print_status(message: &str) {
    eprint!("\r{message}");
    std::io::stderr().flush().ok();
}

pub fn clear_status() {
    eprint!("\r\x1b[2K");
    std::io::stderr().flush().ok();
}
