use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use autopost::config;
use autopost::indexing::indexer_from_config;
use autopost::maintenance;
use autopost::posts::{MdxPostStore, PostStore};
use autopost::throttle::Throttle;

#[derive(Debug, Parser)]
#[command(author, version, about = "Notify the search engine about every published post")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only list the URLs that would be submitted
    #[arg(long)]
    dry_run: bool,
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
    let posts = store.all_posts().await?;
    info!(count = posts.len(), "posts found");

    if args.dry_run {
        for post in &posts {
            println!("{}", cfg.post_url(&post.slug));
        }
        return Ok(());
    }
    if cfg.indexing.is_none() {
        bail!("indexing is not configured");
    }

    let indexer = indexer_from_config(&cfg).await?;
    let throttle = Throttle::from_millis(cfg.app.index_delay_ms);
    let summary =
        maintenance::index_all(&posts, indexer.as_ref(), &cfg.site.base_url, &throttle).await;

    println!(
        "Indexed {} of {} posts ({} failed)",
        summary.succeeded,
        posts.len(),
        summary.failed
    );
    Ok(())
}
