//! Keyword Harvester main entry point
//!
//! This is the command-line interface for the keyword harvester.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use keyword_harvester::config::{load_config_with_hash, Config};
use keyword_harvester::jobs::Job;
use keyword_harvester::recovery::DeadLetterQueue;
use keyword_harvester::Engine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Keyword Harvester: resilient multi-page keyword collection
///
/// Runs keyword searches against a rate-limited content source, retrying
/// transient failures, recovering failed jobs and recording jobs that never
/// succeed in a dead-letter queue.
#[derive(Parser, Debug)]
#[command(name = "keyword-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Resilient multi-page keyword harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest a single keyword and print the finished job
    Run {
        keyword: String,

        /// Page budget (defaults to the configured default)
        #[arg(short = 'p', long)]
        max_pages: Option<u32>,
    },

    /// Harvest several keywords concurrently
    Batch {
        #[arg(required = true)]
        keywords: Vec<String>,

        #[arg(short = 'p', long)]
        max_pages: Option<u32>,
    },

    /// List jobs in the dead-letter queue
    DeadLetters,

    /// Remove a job from the dead-letter queue
    RemoveDeadLetter { job_id: Uuid },

    /// Re-run a dead-lettered job's keyword
    ReplayDeadLetter { job_id: Uuid },

    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    match cli.command {
        Command::CheckConfig => handle_check_config(&config),
        Command::DeadLetters => handle_dead_letters(&config),
        Command::RemoveDeadLetter { job_id } => handle_remove_dead_letter(&config, job_id),
        Command::Run { keyword, max_pages } => {
            handle_run(config, vec![keyword], max_pages).await
        }
        Command::Batch {
            keywords,
            max_pages,
        } => handle_run(config, keywords, max_pages).await,
        Command::ReplayDeadLetter { job_id } => handle_replay(config, job_id).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("keyword_harvester=info,warn"),
            1 => EnvFilter::new("keyword_harvester=debug,info"),
            2 => EnvFilter::new("keyword_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn handle_check_config(config: &Config) -> anyhow::Result<()> {
    println!("=== Keyword Harvester Configuration ===\n");

    println!("Source:");
    println!("  Endpoint: {}", config.source.endpoint);
    println!("  Source name: {}", config.source.source_name);
    println!("  Base URL: {}", config.source.base_url);
    println!("  Timeout: {}s", config.source.timeout_secs);

    println!("\nRate limits:");
    let mut endpoints: Vec<_> = config.rate_limits.iter().collect();
    endpoints.sort_by(|a, b| a.0.cmp(b.0));
    for (endpoint, limit) in endpoints {
        println!("  {}: {}/s (burst {})", endpoint, limit.rate, limit.capacity);
    }

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Delay: {}ms to {}ms (x{})",
        config.retry.initial_delay_ms, config.retry.max_delay_ms, config.retry.backoff_multiplier
    );

    println!("\nRecovery:");
    println!("  Max retries: {}", config.recovery.max_retries);
    println!("  Delays: {:?}s", config.recovery.retry_delays_secs);
    println!("  Dead-letter file: {}", config.recovery.dead_letter_path);

    println!("\nOutput:");
    match &config.output.database_path {
        Some(path) => println!("  Database: {}", path),
        None => println!("  Database: (none)"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

fn handle_dead_letters(config: &Config) -> anyhow::Result<()> {
    let queue = DeadLetterQueue::open(&config.recovery.dead_letter_path)?;
    let records = queue.get_all();

    if records.is_empty() {
        println!("Dead-letter queue is empty");
        return Ok(());
    }

    println!("{} dead-lettered job(s):\n", records.len());
    for record in records {
        println!("  {} '{}'", record.job_id, record.keyword);
        println!("    attempts: {}", record.attempt_count);
        println!("    last attempt: {}", record.last_attempt.to_rfc3339());
        println!("    error: {}", record.error);
    }
    Ok(())
}

fn handle_remove_dead_letter(config: &Config, job_id: Uuid) -> anyhow::Result<()> {
    let queue = DeadLetterQueue::open(&config.recovery.dead_letter_path)?;
    if queue.remove(job_id)? {
        println!("✓ Removed {} from the dead-letter queue", job_id);
    } else {
        println!("{} is not in the dead-letter queue", job_id);
    }
    Ok(())
}

async fn handle_run(
    config: Config,
    keywords: Vec<String>,
    max_pages: Option<u32>,
) -> anyhow::Result<()> {
    let engine = Engine::from_config(config)?;

    let ids = if keywords.len() == 1 {
        vec![engine.start_job(&keywords[0], max_pages).await?]
    } else {
        engine.start_batch(&keywords, max_pages).await?
    };

    let jobs = wait_all(&engine, &ids).await?;
    engine.shutdown().await;

    let mut failed = 0;
    for job in &jobs {
        print_job(job);
        if job.status != keyword_harvester::jobs::JobStatus::Completed {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} job(s) did not complete", failed, jobs.len());
    }
    Ok(())
}

async fn handle_replay(config: Config, job_id: Uuid) -> anyhow::Result<()> {
    let engine = Engine::from_config(config)?;

    let id = engine.replay_dead_letter(job_id).await?;
    let jobs = wait_all(&engine, &[id]).await?;
    engine.shutdown().await;

    for job in &jobs {
        print_job(job);
    }
    Ok(())
}

/// Waits for every job, cancelling them all on Ctrl-C
async fn wait_all(engine: &Engine, ids: &[Uuid]) -> anyhow::Result<Vec<Job>> {
    let waiting = async {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.push(engine.wait(*id).await?);
        }
        Ok::<_, keyword_harvester::HarvestError>(jobs)
    };

    tokio::select! {
        jobs = waiting => Ok(jobs?),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; cancelling running jobs");
            engine.shutdown().await;
            bail!("interrupted")
        }
    }
}

fn print_job(job: &Job) {
    println!("Job {} '{}': {}", job.id, job.keyword, job.status);
    println!("  {}", job.message);

    if let Some(results) = &job.results {
        println!(
            "  pages: {}, found: {}, valid: {}, quality: {:.3}",
            results.pages_scraped, results.total_found, results.valid_records, results.quality_score
        );
        if let Some(locator) = &results.locator {
            println!("  stored at: {}", locator);
        }
        if results.from_cache {
            println!("  (served from cache)");
        }
    }
}
