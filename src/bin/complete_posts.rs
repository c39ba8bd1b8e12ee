use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use autopost::config;
use autopost::maintenance;
use autopost::posts::MdxPostStore;
use autopost::text::AnthropicClient;
use autopost::throttle::Throttle;

#[derive(Debug, Parser)]
#[command(author, version, about = "Finish posts whose generation was cut off")]
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

    let store = MdxPostStore::new(&cfg.app.posts_dir, &cfg.site.author);
    let client = AnthropicClient::from_config(&cfg).await?;
    let throttle = Throttle::from_millis(cfg.app.completion_delay_ms);

    let summary = maintenance::complete_truncated_posts(&store, &client, &throttle).await?;
    println!(
        "Checked {} posts: {} completed, {} failed",
        summary.checked, summary.completed, summary.failed
    );
    Ok(())
}
