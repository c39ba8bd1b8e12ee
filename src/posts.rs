//! Post store: published MDX documents under the posts directory.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{instrument, warn};

use crate::document::Document;
use crate::model::Post;
use crate::topics::write_atomic;

const EXTENSION: &str = "mdx";

#[async_trait]
pub trait PostStore: Send + Sync {
    /// All published posts, newest first.
    async fn all_posts(&self) -> Result<Vec<Post>>;
}

#[derive(Debug, Clone)]
pub struct MdxPostStore {
    dir: PathBuf,
    default_author: String,
}

impl MdxPostStore {
    pub fn new(dir: impl Into<PathBuf>, default_author: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_author: default_author.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", slug, EXTENSION))
    }

    /// Slugs of every `.mdx` file, sorted by file name. A missing directory has no posts.
    pub async fn post_slugs(&self) -> Result<Vec<String>> {
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to list posts: {}", self.dir.display()))?;
        let mut slugs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slugs.push(stem.to_string());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    pub async fn read_document(&self, slug: &str) -> Result<Document> {
        let path = self.path_for(slug);
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read post: {}", path.display()))?;
        Document::parse(&raw).with_context(|| format!("invalid post: {}", path.display()))
    }

    pub async fn write_document(&self, slug: &str, doc: &Document) -> Result<()> {
        let rendered = doc.render()?;
        write_atomic(&self.path_for(slug), rendered.as_bytes()).await
    }

    pub async fn read_post(&self, slug: &str) -> Result<Post> {
        let doc = self.read_document(slug).await?;
        Ok(doc.into_post(slug, &self.default_author))
    }
}

#[async_trait]
impl PostStore for MdxPostStore {
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    async fn all_posts(&self) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        for slug in self.post_slugs().await? {
            match self.read_post(&slug).await {
                Ok(post) => posts.push(post),
                Err(err) => warn!(?err, %slug, "skipping unreadable post"),
            }
        }
        sort_newest_first(&mut posts);
        Ok(posts)
    }
}

/// Stable sort by `publishedAt` descending; unparseable dates go last.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| published_at(b).cmp(&published_at(a)));
}

fn published_at(post: &Post) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(post.published_at.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
