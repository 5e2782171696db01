mod app;
mod args;
mod commands;
mod logging;
mod processor;

use anyhow::Result;
use clap::Parser;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Polish(args) => commands::polish::run(args).await,
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Config(args) => commands::config::run(args),
    }
}
