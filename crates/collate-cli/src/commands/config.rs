use anyhow::Result;
use collate_core::Settings;

use crate::args::ConfigArgs;

pub fn run(args: ConfigArgs) -> Result<()> {
    let mut settings = Settings::load();
    let mut changed = false;

    if let Some(provider) = args.provider {
        settings.refine.provider = provider;
        println!("Provider set to {}", provider.display_name());
        changed = true;
    }

    if let Some(model) = args.model {
        println!("Model set to {model}");
        settings.refine.model = Some(model);
        changed = true;
    }

    if let Some(key) = args.api_key {
        let provider = settings.refine.provider;
        settings.refine.set_api_key(provider, key);
        println!("{} API key saved", provider.display_name());
        changed = true;
    }

    if let Some(url) = args.base_url {
        println!("Base URL set to {url}");
        settings.refine.base_url = Some(url);
        changed = true;
    }

    if changed {
        settings.save()?;
        println!("Config saved to {}", Settings::path().display());
    }

    if args.show || !changed {
        show(&settings);
    }

    Ok(())
}

fn show(settings: &Settings) {
    let refine = &settings.refine;
    let key = match refine.api_key() {
        Some(key) => mask_key(&key),
        None if refine.provider.requires_api_key() => "(not set)".to_string(),
        None => "(not needed)".to_string(),
    };
    let split_limit = refine.polish_config().split_limit;

    println!("Config file:     {}", Settings::path().display());
    println!("Provider:        {}", refine.provider.display_name());
    println!("Model:           {}", refine.model());
    println!("Base URL:        {}", refine.base_url());
    println!("API key:         {key}");
    println!("Max tokens:      {}", refine.max_tokens);
    println!("Split limit:     {split_limit}");
    println!("Concurrency:     {}", refine.max_concurrency);
    println!("Per minute:      {}", refine.max_per_minute);
    println!("Attempts:        {}", refine.max_retries);
    println!("Mode:            {:?}", refine.mode);
    println!("On failure:      {:?}", refine.on_failure);
    println!("Queue capacity:  {}", settings.queue.capacity);
}

/// Show only the ends of a key
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
