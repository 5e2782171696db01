use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use collate_core::RefineProvider;

#[derive(Parser)]
#[command(name = "collate")]
#[command(version)]
#[command(about = "Polish speech-recognition transcripts with an LLM")]
pub struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Polish one transcript file and print or save the result
    Polish(PolishArgs),

    /// Queue transcript files as jobs and process them one by one
    Run(RunArgs),

    /// Show or change settings
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PolishArgs {
    /// Transcript file to polish
    pub file: PathBuf,

    /// Write the polished text here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Refine chunks one after another
    #[arg(long)]
    pub sequential: bool,

    /// Chunks refined at the same time
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Refine calls allowed per minute
    #[arg(long)]
    pub per_minute: Option<usize>,

    /// Characters per chunk
    #[arg(long)]
    pub split_limit: Option<usize>,

    /// Abort when a chunk keeps failing instead of keeping its original text
    #[arg(long)]
    pub fail_hard: bool,

    /// Print every chunk before and after refinement to stderr
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Transcript files to process
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Clean the transcripts without calling the LLM
    #[arg(long)]
    pub no_polish: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print the current settings
    #[arg(long)]
    pub show: bool,

    /// Refine provider (deepseek, openai, mistral, gemini, ollama)
    #[arg(long)]
    pub provider: Option<RefineProvider>,

    /// Model name for the current provider
    #[arg(long)]
    pub model: Option<String>,

    /// API key for the current provider
    #[arg(long)]
    pub api_key: Option<String>,

    /// Override the provider's API base URL
    #[arg(long)]
    pub base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polish_flags() {
        let cli = Cli::try_parse_from([
            "collate",
            "polish",
            "talk.txt",
            "--sequential",
            "--split-limit",
            "800",
            "--fail-hard",
        ])
        .unwrap();
        let Commands::Polish(args) = cli.command else {
            panic!("expected polish command");
        };
        assert_eq!(args.file, PathBuf::from("talk.txt"));
        assert!(args.sequential);
        assert!(args.fail_hard);
        assert_eq!(args.split_limit, Some(800));
        assert!(args.output.is_none());
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Cli::try_parse_from(["collate", "run"]).is_err());
        let cli = Cli::try_parse_from(["collate", "-v", "run", "a.txt", "b.txt"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_config_provider_parses() {
        let cli = Cli::try_parse_from(["collate", "config", "--provider", "local"]).unwrap();
        let Commands::Config(args) = cli.command else {
            panic!("expected config command");
        };
        assert_eq!(args.provider, Some(RefineProvider::Ollama));
    }
}
