use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use autopost::config;
use autopost::images::TogetherImageClient;
use autopost::maintenance;
use autopost::posts::MdxPostStore;
use autopost::publish::sink_from_config;
use autopost::throttle::Throttle;

/// Pause between posts; one image request each.
const REGENERATE_DELAY_MS: u64 = 2000;

#[derive(Debug, Parser)]
#[command(author, version, about = "Replace the featured image of every post")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let store = MdxPostStore::new(&cfg.app.posts_dir, &cfg.site.author);
    let images = TogetherImageClient::from_config(&cfg, sink_from_config(&cfg)?)?;
    let throttle = Throttle::from_millis(REGENERATE_DELAY_MS);

    let summary = maintenance::regenerate_images(&store, &images, &throttle).await?;
    println!(
        "Regenerated images: {} updated, {} failed",
        summary.updated, summary.failed
    );
    Ok(())
}
