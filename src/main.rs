//! embedeval - Main CLI Entry Point

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use embedeval::cli::{render_presets, render_report, Args, CacheCommand, Commands, RunArgs, Verbosity};
use embedeval::dataset::{load_documents, load_test_cases};
use embedeval::runner::JobProgress;
use embedeval::strategy::load_variants;
use embedeval::{
    EmbeddingCache, EvalConfig, HashEmbeddingProvider, JobRunner, PipelineExecutor, PipelineServices,
    RunnerOptions, StrategyVariant,
};

fn init_tracing(verbosity: Verbosity) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let config = EvalConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match &args.command {
        Commands::Run(run) => run_evaluation(&config, run).await,
        Commands::Presets => {
            print!("{}", render_presets());
            Ok(())
        }
        Commands::Cache { action } => manage_cache(&config, *action).await,
    }
}

fn select_variants(run: &RunArgs) -> Result<Vec<StrategyVariant>> {
    let mut variants = Vec::new();
    if let Some(path) = &run.strategy_file {
        variants.extend(
            load_variants(path).with_context(|| format!("Failed to load strategies from {}", path.display()))?,
        );
    }

    let names = if run.strategies.is_empty() && variants.is_empty() {
        RunArgs::default_strategies()
    } else {
        run.strategies.clone()
    };
    for name in &names {
        if variants.iter().any(|v| &v.id == name) {
            bail!("strategy '{}' given twice", name);
        }
        variants.push(StrategyVariant::preset(name)?);
    }
    Ok(variants)
}

fn test_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string())
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg:<16} [{bar:30.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

async fn run_evaluation(config: &EvalConfig, run: &RunArgs) -> Result<()> {
    let mut config = config.clone();
    if let Some(concurrency) = run.concurrency {
        config.runner.concurrency = concurrency;
    }
    if !run.k_values.is_empty() {
        config.runner.k_values = run.k_values.clone();
    }
    config.validate()?;

    let documents = Arc::new(
        load_documents(&run.corpus).with_context(|| format!("Failed to load corpus {}", run.corpus.display()))?,
    );
    let test_cases =
        load_test_cases(&run.queries).with_context(|| format!("Failed to load queries {}", run.queries.display()))?;
    let variants = select_variants(run)?;

    let provider = Arc::new(HashEmbeddingProvider::new(config.provider.dimension)?);
    let mut services = PipelineServices::new().with_provider(provider);
    let cache = if config.cache.enabled && !run.no_cache {
        let cache = EmbeddingCache::open(config.cache_dir(), config.cache.max_bytes)
            .await
            .context("Failed to open embedding cache")?;
        services = services.with_cache(cache.clone());
        Some(cache)
    } else {
        None
    };

    let mut options = RunnerOptions::from_config(&config, test_id_for(&run.queries));
    options.run_id = run.run_id.clone();

    let pb = progress_bar()?;
    let hook_pb = pb.clone();
    let runner = JobRunner::new(PipelineExecutor::default(), services, options).with_progress(Arc::new(
        move |progress: &JobProgress| {
            hook_pb.set_length(progress.total as u64);
            hook_pb.set_position(progress.done as u64);
            hook_pb.set_message(progress.variant_id.clone());
        },
    ));

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested, finishing in-flight jobs");
            stop.stop();
        }
    });

    info!(
        documents = documents.len(),
        queries = test_cases.len(),
        variants = variants.len(),
        "starting evaluation"
    );
    let report = runner.run(&variants, documents, &test_cases).await?;
    pb.finish_and_clear();

    if let Some(cache) = &cache {
        cache.flush().await?;
    }

    let output = run
        .output
        .clone()
        .unwrap_or_else(|| config.output_dir().join(format!("{}.json", report.run_id)));
    report
        .write_json(&output)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;

    print!("{}", render_report(&report));
    println!("\nReport written to {}", output.display().to_string().cyan());
    if report.interrupted {
        println!("Resume with: embedeval run ... --run-id {}", report.run_id);
    }
    Ok(())
}

async fn manage_cache(config: &EvalConfig, action: CacheCommand) -> Result<()> {
    let cache = EmbeddingCache::open(config.cache_dir(), config.cache.max_bytes)
        .await
        .context("Failed to open embedding cache")?;

    match action {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            println!("{}", "Embedding cache".bold());
            println!("  Location: {}", config.cache_dir().display());
            println!("  Entries:  {}", stats.entries);
            println!(
                "  Size:     {} / {} bytes ({:.1}%)",
                stats.total_bytes,
                stats.max_bytes,
                stats.total_bytes as f64 * 100.0 / stats.max_bytes as f64
            );
        }
        CacheCommand::Clear => {
            let before = cache.stats().await?;
            cache.clear().await?;
            println!("{} Removed {} cached embeddings", "✓".green(), before.entries);
        }
    }
    Ok(())
}
