use anyhow::{bail, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use autopost::config;
use autopost::indexing::{GoogleIndexer, Indexer, ServiceAccountKey};

#[derive(Debug, Parser)]
#[command(author, version, about = "Notify the search engine about a single post URL")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Full URL, or a post slug resolved against site.base_url
    target: String,

    /// Print the indexing metadata instead of sending a notification
    #[arg(long)]
    status: bool,
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
    let Some(indexing) = cfg.indexing.as_ref() else {
        bail!("indexing is not configured");
    };

    let url = if args.target.starts_with("http://") || args.target.starts_with("https://") {
        args.target.clone()
    } else {
        cfg.post_url(&args.target)
    };

    let key = ServiceAccountKey::load(Path::new(&indexing.credentials_path)).await?;
    let indexer = GoogleIndexer::new(key)?;

    if args.status {
        let status = indexer.url_status(&url).await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        indexer.notify(&url).await?;
        println!("Requested indexing for {}", url);
    }
    Ok(())
}
