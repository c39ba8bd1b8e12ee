use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use autopost::config;
use autopost::maintenance;
use autopost::posts::MdxPostStore;
use autopost::topics::{JsonTopicStore, TopicStore};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Mark topics as published when a matching post file already exists"
)]
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

    let store = JsonTopicStore::new(&cfg.app.topics_path);
    let mut topics = store.load_topics().await?;
    let slugs = MdxPostStore::new(&cfg.app.posts_dir, &cfg.site.author)
        .post_slugs()
        .await?;
    info!(topics = topics.len(), posts = slugs.len(), "loaded stores");

    let updated = maintenance::sync_topics_with_files(&mut topics, &slugs, Utc::now());
    if updated > 0 {
        store.save_topics(&topics).await?;
    }

    let published = topics.iter().filter(|t| t.published).count();
    println!(
        "Updated {} topics; {} published, {} remaining",
        updated,
        published,
        topics.len() - published
    );
    Ok(())
}
