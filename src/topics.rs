//! Topic store: the ordered list of candidate topics, read and overwritten whole.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use crate::model::Topic;

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// All topics in store order.
    async fn load_topics(&self) -> Result<Vec<Topic>>;

    /// Replace the whole collection.
    async fn save_topics(&self, topics: &[Topic]) -> Result<()>;
}

/// Topics kept in a pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonTopicStore {
    path: PathBuf,
}

impl JsonTopicStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TopicStore for JsonTopicStore {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load_topics(&self) -> Result<Vec<Topic>> {
        let raw = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read topics: {}", self.path.display()))?;
        let topics: Vec<Topic> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid topics JSON: {}", self.path.display()))?;
        debug!(count = topics.len(), "loaded topics");
        Ok(topics)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn save_topics(&self, topics: &[Topic]) -> Result<()> {
        let content = serialize_topics(topics)?;
        write_atomic(&self.path, content.as_bytes()).await
    }
}

/// Serialized form shared by the local store and remote mirrors.
pub fn serialize_topics(topics: &[Topic]) -> Result<String> {
    serde_json::to_string_pretty(topics).context("failed to encode topics")
}

/// First `limit` unpublished topics, in store order.
pub fn unpublished(topics: &[Topic], limit: usize) -> Vec<Topic> {
    topics
        .iter()
        .filter(|t| !t.published)
        .take(limit)
        .cloned()
        .collect()
}

/// Write to a sibling temp file, fsync, then rename over the target so readers
/// never observe a half-written file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let mut file = fs::File::create(&tmp)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp.display()))?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content)
        .await
        .with_context(|| format!("failed to write temp file: {}", tmp.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("failed to sync temp file: {}", tmp.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}
