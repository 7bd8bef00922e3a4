//! spring83-keygen - find an Ed25519 keypair valid for Spring '83 publishing
//!
//! Searches on every CPU until a public key with the `83eMMYY` suffix turns
//! up, writes the private key to a dated file and prints a short summary.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use spring83_keygen::output;
use spring83_keygen::search::Progress;
use spring83_keygen::{Config, RngKeySource, Search};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spring83-keygen")]
#[command(author, version, about = "Generate an Ed25519 keypair valid for Spring '83", long_about = None)]
struct Cli {
    /// A vanity regex that the public key must also match
    #[arg(long, value_name = "REGEX")]
    vanity: Option<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of search workers (default: one per CPU)
    #[arg(short = 'j', long, value_name = "N")]
    workers: Option<usize>,

    /// Directory the keypair file is written to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Don't show the progress spinner
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the report
    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(vanity) = cli.vanity {
        config.vanity = Some(vanity);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    // Fail on a bad vanity regex or unusable output directory before any worker starts
    let filter = config.compile_filter()?;
    output::ensure_output_dir(&config.output_dir)?;
    let search = Search::new(filter, config.worker_count());

    let spinner = spinner(cli.quiet)?;
    let ticker = tokio::spawn(track(search.progress(), spinner.clone()));

    let outcome = search.run(|_| RngKeySource::os()).await;
    ticker.abort();
    spinner.finish_and_clear();
    let outcome = outcome?;

    let report = output::emit(
        &config.output_dir,
        &config.file_prefix,
        Local::now().date_naive(),
        &outcome,
    )
    .with_context(|| format!("writing keypair into {}", config.output_dir.display()))?;

    println!("{}", report);

    Ok(())
}

fn spinner(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} candidates ({per_sec})")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

async fn track(progress: Progress, pb: ProgressBar) {
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    loop {
        interval.tick().await;
        pb.set_position(progress.total());
    }
}
