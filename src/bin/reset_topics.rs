use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use autopost::config;
use autopost::maintenance;
use autopost::topics::{JsonTopicStore, TopicStore};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Rewrite publication flags: ids up to N published, the rest queued"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Highest topic id that stays published
    #[arg(long)]
    published_through: u32,
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
    let published = maintenance::reset_topics(&mut topics, args.published_through, Utc::now());
    store.save_topics(&topics).await?;

    println!(
        "{} published, {} queued for generation",
        published,
        topics.len() - published
    );
    Ok(())
}
