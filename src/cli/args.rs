//! Command-line argument parsing for embedeval
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// embedeval - Evaluate retrieval strategies against a labeled corpus
#[derive(Parser, Debug)]
#[command(name = "embedeval")]
#[command(version)]
#[command(about = "Evaluate chunking, retrieval, fusion and reranking strategies", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.embedeval/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate strategies over a corpus and query set
    Run(RunArgs),

    /// List built-in strategy presets
    Presets,

    /// Inspect or clear the embedding cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Corpus JSONL file, one document per line
    #[arg(long)]
    pub corpus: PathBuf,

    /// Query JSONL file, one test case per line
    #[arg(long)]
    pub queries: PathBuf,

    /// Preset strategy to evaluate (repeatable)
    #[arg(short, long = "strategy", value_name = "NAME")]
    pub strategies: Vec<String>,

    /// JSON file with custom strategy variants
    #[arg(long = "strategies", value_name = "FILE")]
    pub strategy_file: Option<PathBuf>,

    /// Resume an earlier run by id
    #[arg(long)]
    pub run_id: Option<String>,

    /// Maximum concurrent jobs
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Metric cutoff K (repeatable)
    #[arg(short = 'k', value_name = "K")]
    pub k_values: Vec<usize>,

    /// Report output path (default: <output_dir>/<run_id>.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the embedding cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Show entry count, size and limit
    Stats,
    /// Remove every cached embedding
    Clear,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Verbosity {
    /// Default tracing filter for this level
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl RunArgs {
    /// Presets to run when neither presets nor a strategy file were given
    pub fn default_strategies() -> Vec<String> {
        vec!["baseline".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parsing() {
        let args = Args::try_parse_from([
            "embedeval",
            "run",
            "--corpus",
            "docs.jsonl",
            "--queries",
            "q.jsonl",
            "--strategy",
            "baseline",
            "-s",
            "hybrid-bm25",
            "-k",
            "5",
            "-k",
            "10",
            "--concurrency",
            "3",
        ])
        .unwrap();

        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.strategies, vec!["baseline", "hybrid-bm25"]);
                assert_eq!(run.k_values, vec![5, 10]);
                assert_eq!(run.concurrency, Some(3));
                assert!(run.strategy_file.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_strategy_file_flag() {
        let args = Args::try_parse_from([
            "embedeval",
            "run",
            "--corpus",
            "c",
            "--queries",
            "q",
            "--strategies",
            "variants.json",
        ])
        .unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.strategy_file, Some(PathBuf::from("variants.json")));
        assert!(run.strategies.is_empty());
    }

    #[test]
    fn test_cache_subcommand() {
        let args = Args::try_parse_from(["embedeval", "cache", "clear"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Cache {
                action: CacheCommand::Clear
            }
        ));
    }

    #[test]
    fn test_verbosity() {
        let args = Args::try_parse_from(["embedeval", "-vv", "presets"]).unwrap();
        assert_eq!(args.verbosity(), Verbosity::VeryVerbose);
        assert_eq!(args.verbosity().filter(), "trace");

        let args = Args::try_parse_from(["embedeval", "presets", "-q"]).unwrap();
        assert_eq!(args.verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_run_requires_inputs() {
        assert!(Args::try_parse_from(["embedeval", "run", "--corpus", "c"]).is_err());
    }
}
