use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use autopost::config;
use autopost::model::BatchReport;
use autopost::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate and publish a batch of blog posts")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Number of topics to process (defaults to app.batch_size)
    #[arg(long)]
    count: Option<NonZeroUsize>,

    /// Exit with status 1 when any topic failed
    #[arg(long)]
    strict: bool,
}

/// Hold an exclusive lock for the lifetime of the returned file.
fn acquire_run_lock(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "another batch run holds {}; refusing to start",
            path.display()
        )
    })?;
    Ok(file)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let _lock = acquire_run_lock(&cfg.lock_path())?;

    let count = match args.count {
        Some(count) => count,
        None => NonZeroUsize::new(cfg.app.batch_size).context("app.batch_size must be positive")?,
    };

    let orchestrator = Orchestrator::from_config(&cfg).await?;
    info!(count = count.get(), "starting blog generation");
    let result = match orchestrator.run_batch(count).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "batch aborted");
            return Err(err.into());
        }
    };

    let report = BatchReport::new(&result, Utc::now());
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.strict && !result.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
