use tracing_subscriber::EnvFilter;

/// Route logs to stderr. `RUST_LOG` wins over the verbose flag.
pub fn init(verbose: bool) {
    let default = if verbose {
        "collate=debug,collate_core=debug"
    } else {
        "collate=warn,collate_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
