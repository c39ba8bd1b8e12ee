//! Persistence of generated posts and of the publication record.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{Config, Github};
use crate::error::PipelineError;
use crate::topics::{self, write_atomic, TopicStore};

const POSTS_REPO_DIR: &str = "content/blog";
const TOPICS_REPO_PATH: &str = "content/blog-topics.json";
const IMAGES_REPO_DIR: &str = "public/images/blog";

/// Durable destination for documents, their images and the serialized topic list.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn write_document(&self, slug: &str, content: &str) -> Result<()>;

    /// Store an encoded image under `file_name` next to the other post images.
    async fn write_image(&self, file_name: &str, content: &[u8]) -> Result<()>;

    async fn write_topics(&self, content: &str) -> Result<()>;
}

/// Writes documents into the local posts directory and images into the
/// local images directory. The local topics file is owned by the topic store,
/// so `write_topics` has nothing left to do here.
#[derive(Debug, Clone)]
pub struct LocalSink {
    posts_dir: PathBuf,
    images_dir: PathBuf,
}

impl LocalSink {
    pub fn new(posts_dir: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            posts_dir: posts_dir.into(),
            images_dir: images_dir.into(),
        }
    }
}

#[async_trait]
impl PublishSink for LocalSink {
    #[instrument(skip(self, content))]
    async fn write_document(&self, slug: &str, content: &str) -> Result<()> {
        let path = self.posts_dir.join(format!("{}.mdx", slug));
        write_atomic(&path, content.as_bytes()).await?;
        info!(path = %path.display(), "saved post");
        Ok(())
    }

    #[instrument(skip(self, content))]
    async fn write_image(&self, file_name: &str, content: &[u8]) -> Result<()> {
        let path = self.images_dir.join(file_name);
        write_atomic(&path, content).await?;
        info!(path = %path.display(), size_kb = content.len() / 1024, "saved image");
        Ok(())
    }

    async fn write_topics(&self, _content: &str) -> Result<()> {
        Ok(())
    }
}

/// Commits files through the hosting provider's repository contents API.
#[derive(Clone)]
pub struct GithubSink {
    http: Client,
    api_base: Url,
    token: String,
    owner: String,
    repo: String,
    branch: String,
    path_prefix: String,
}

impl fmt::Debug for GithubSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSink")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl GithubSink {
    pub fn new(cfg: &Github) -> Result<Self> {
        let api_base = Url::parse(&cfg.api_base).context("invalid github.api_base")?;
        let http = Client::builder()
            .user_agent("autopost/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base,
            token: cfg.token.clone(),
            owner: cfg.owner.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
            path_prefix: cfg.path_prefix.trim_matches('/').to_string(),
        })
    }

    /// Repository path with the configured prefix applied once.
    pub fn repo_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.path_prefix.is_empty() || path.starts_with(&format!("{}/", self.path_prefix)) {
            path.to_string()
        } else {
            format!("{}/{}", self.path_prefix, path)
        }
    }

    pub fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("github.api_base cannot be a base URL"))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(self.repo_path(path).split('/'));
        Ok(url)
    }

    pub fn build_put_request(
        &self,
        url: Url,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<reqwest::Request> {
        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        self.http
            .put(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .build()
            .context("failed to build contents request")
    }

    /// Blob SHA of an existing file, required to update it.
    async fn existing_sha(&self, url: &Url) -> Result<Option<String>> {
        let res = self
            .http
            .get(url.clone())
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .context("failed to reach contents API")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("contents lookup failed {}: {}", status, body));
        }
        let file: ContentsFile = res.json().await.context("invalid contents API response")?;
        Ok(Some(file.sha))
    }

    #[instrument(skip(self, content))]
    pub async fn put_file(&self, path: &str, content: &[u8], message: &str) -> Result<()> {
        let url = self.contents_url(path)?;
        let sha = self.existing_sha(&url).await?;
        let request = self.build_put_request(url, content, message, sha.as_deref())?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach contents API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("contents upload failed {}: {}", status, body));
        }
        info!(path = %self.repo_path(path), "uploaded to repository");
        Ok(())
    }
}

#[async_trait]
impl PublishSink for GithubSink {
    async fn write_document(&self, slug: &str, content: &str) -> Result<()> {
        let path = format!("{}/{}.mdx", POSTS_REPO_DIR, slug);
        self.put_file(&path, content.as_bytes(), &format!("Add post: {}", slug))
            .await
    }

    async fn write_image(&self, file_name: &str, content: &[u8]) -> Result<()> {
        let path = format!("{}/{}", IMAGES_REPO_DIR, file_name);
        self.put_file(&path, content, &format!("Add image: {}", file_name))
            .await
    }

    async fn write_topics(&self, content: &str) -> Result<()> {
        self.put_file(TOPICS_REPO_PATH, content.as_bytes(), "Update blog topics")
            .await
    }
}

/// Writes to the local sink first, then the mirror; either failing fails the write.
pub struct MirroredSink {
    primary: Arc<dyn PublishSink>,
    mirror: Arc<dyn PublishSink>,
}

impl MirroredSink {
    pub fn new(primary: Arc<dyn PublishSink>, mirror: Arc<dyn PublishSink>) -> Self {
        Self { primary, mirror }
    }
}

#[async_trait]
impl PublishSink for MirroredSink {
    async fn write_document(&self, slug: &str, content: &str) -> Result<()> {
        self.primary.write_document(slug, content).await?;
        self.mirror
            .write_document(slug, content)
            .await
            .context("mirror write failed")
    }

    async fn write_image(&self, file_name: &str, content: &[u8]) -> Result<()> {
        self.primary.write_image(file_name, content).await?;
        self.mirror
            .write_image(file_name, content)
            .await
            .context("mirror write failed")
    }

    async fn write_topics(&self, content: &str) -> Result<()> {
        self.primary.write_topics(content).await?;
        self.mirror
            .write_topics(content)
            .await
            .context("mirror write failed")
    }
}

/// Local posts and images directories, mirrored to the repository when
/// `github` is configured.
pub fn sink_from_config(cfg: &Config) -> Result<Arc<dyn PublishSink>> {
    let local: Arc<dyn PublishSink> =
        Arc::new(LocalSink::new(&cfg.app.posts_dir, &cfg.app.images_dir));
    match &cfg.github {
        Some(github) => {
            let mirror: Arc<dyn PublishSink> = Arc::new(GithubSink::new(github)?);
            Ok(Arc::new(MirroredSink::new(local, mirror)))
        }
        None => Ok(local),
    }
}

/// Persists documents and flips topics to published, in that order.
#[derive(Clone)]
pub struct Publisher {
    topics: Arc<dyn TopicStore>,
    sink: Arc<dyn PublishSink>,
}

impl Publisher {
    pub fn new(topics: Arc<dyn TopicStore>, sink: Arc<dyn PublishSink>) -> Self {
        Self { topics, sink }
    }

    pub async fn persist_document(&self, slug: &str, content: &str) -> Result<(), PipelineError> {
        self.sink
            .write_document(slug, content)
            .await
            .map_err(|cause| PipelineError::Persist {
                slug: slug.to_string(),
                cause,
            })
    }

    /// Re-read the store, mark `topic_id` published, mirror the new list and
    /// finally save it locally. The local save is the commit point: until it
    /// succeeds the topic stays eligible for the next run.
    #[instrument(skip(self))]
    pub async fn mark_published(
        &self,
        topic_id: u32,
        slug: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut all = self
            .topics
            .load_topics()
            .await
            .map_err(PipelineError::TopicUpdate)?;
        let topic = all
            .iter_mut()
            .find(|t| t.id == topic_id)
            .ok_or(PipelineError::TopicNotFound(topic_id))?;
        topic.mark_published(slug, at);

        let serialized = topics::serialize_topics(&all).map_err(PipelineError::TopicUpdate)?;
        self.sink
            .write_topics(&serialized)
            .await
            .map_err(PipelineError::TopicUpdate)?;
        self.topics
            .save_topics(&all)
            .await
            .map_err(PipelineError::TopicUpdate)?;
        info!(topic_id, %slug, "topic marked published");
        Ok(())
    }
}

#[derive(Deserialize)]
struct ContentsFile {
    sha: String,
}
