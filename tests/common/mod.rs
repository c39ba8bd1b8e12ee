#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify};

use autopost::config::{self, Config};
use autopost::images::{ImageProvider, TogetherImageClient};
use autopost::indexing::Indexer;
use autopost::model::{Post, Topic};
use autopost::orchestrator::{Collaborators, Orchestrator, PipelineSettings};
use autopost::posts::{MdxPostStore, PostStore};
use autopost::publish::{LocalSink, PublishSink};
use autopost::text::{GenerationRequest, TextProvider};
use autopost::throttle::Throttle;
use autopost::topics::{serialize_topics, JsonTopicStore, TopicStore};

pub const SITE: &str = "https://site.test";

pub fn topic(id: u32, keyword: &str, category: &str) -> Topic {
    serde_json::from_value(json!({
        "id": id,
        "target_keyword": keyword,
        "search_volume": "1000",
        "seo_difficulty": "low",
        "title": format!("{} 완벽 가이드", keyword),
        "search_intent": "정보 탐색",
        "category": category,
        "published": false,
        "scheduled_date": null,
        "slug": null
    }))
    .unwrap()
}

/// Image provider that replays queued outcomes, then succeeds with unique refs.
#[derive(Clone, Default)]
pub struct ScriptedImages {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<(String, usize)>>>,
}

impl ScriptedImages {
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ImageProvider for ScriptedImages {
    async fn generate_image(&self, keyword: &str, index: usize) -> Result<String> {
        let n = {
            let mut calls = self.calls.lock().await;
            calls.push((keyword.to_string(), index));
            calls.len()
        };
        let mut guard = self.responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(format!("/images/blog/generated-{}.webp", n)))
    }
}

/// Image provider that skips the network: a small PNG goes through the real
/// WebP conversion and is stored with the given sink.
pub struct SinkImages {
    client: TogetherImageClient,
}

impl SinkImages {
    pub fn new(sink: Arc<dyn PublishSink>) -> Self {
        let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
        cfg.image.output_width = 120;
        cfg.image.output_height = 90;
        Self {
            client: TogetherImageClient::from_config(&cfg, sink).unwrap(),
        }
    }
}

#[async_trait]
impl ImageProvider for SinkImages {
    async fn generate_image(&self, keyword: &str, index: usize) -> Result<String> {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(64, 48)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        self.client.store_image(keyword, index, png.into_inner()).await
    }
}

/// Text provider that records requests and, unless told otherwise, writes a
/// fenced MDX document embedding every image it was given.
#[derive(Clone, Default)]
pub struct RecordingText {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl RecordingText {
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

pub fn render_document(request: &GenerationRequest) -> String {
    let images = request
        .image_refs
        .iter()
        .map(|r| format!("![{}]({})", request.topic.target_keyword, r))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "```mdx\n---\ntitle: \"{}\"\ncategory: \"{}\"\npublishedAt: \"2026-01-0{}T00:00:00.000Z\"\nfeaturedImage: \"{}\"\n---\n\n{} 도입부입니다.\n\n{}\n\n## 마무리\n\n끝입니다.\n```",
        request.topic.title,
        request.topic.category,
        request.topic.id % 10,
        request.image_refs.first().cloned().unwrap_or_default(),
        request.topic.target_keyword,
        images,
    )
}

#[async_trait]
impl TextProvider for RecordingText {
    async fn generate_document(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        let queued = self.responses.lock().await.pop_front();
        queued.unwrap_or_else(|| Ok(render_document(request)))
    }

    async fn continue_document(&self, _title: &str, _content: &str) -> Result<String> {
        Err(anyhow!("continuation not scripted"))
    }
}

#[derive(Clone, Default)]
pub struct RecordingIndexer {
    calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingIndexer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().await.clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl Indexer for RecordingIndexer {
    async fn notify(&self, url: &str) -> Result<()> {
        self.calls.lock().await.push(url.to_string());
        if self.fail {
            return Err(anyhow!("indexing quota exceeded"));
        }
        Ok(())
    }
}

/// Local sink that records image writes and can be told to fail documents
/// for given slugs, every image or every topics write.
pub struct FlakySink {
    inner: LocalSink,
    images: Mutex<Vec<String>>,
    fail_documents: HashSet<String>,
    fail_images: bool,
    fail_topics: bool,
}

impl FlakySink {
    pub fn new(posts_dir: PathBuf, images_dir: PathBuf) -> Self {
        Self {
            inner: LocalSink::new(posts_dir, images_dir),
            images: Mutex::new(Vec::new()),
            fail_documents: HashSet::new(),
            fail_images: false,
            fail_topics: false,
        }
    }

    pub fn failing_images(mut self) -> Self {
        self.fail_images = true;
        self
    }

    pub async fn images(&self) -> Vec<String> {
        self.images.lock().await.clone()
    }

    pub fn failing_document(mut self, slug: &str) -> Self {
        self.fail_documents.insert(slug.to_string());
        self
    }

    pub fn failing_topics(mut self) -> Self {
        self.fail_topics = true;
        self
    }
}

#[async_trait]
impl PublishSink for FlakySink {
    async fn write_document(&self, slug: &str, content: &str) -> Result<()> {
        if self.fail_documents.contains(slug) {
            return Err(anyhow!("repository rejected {}", slug));
        }
        self.inner.write_document(slug, content).await
    }

    async fn write_image(&self, file_name: &str, content: &[u8]) -> Result<()> {
        if self.fail_images {
            return Err(anyhow!("repository rejected {}", file_name));
        }
        self.inner.write_image(file_name, content).await?;
        self.images.lock().await.push(file_name.to_string());
        Ok(())
    }

    async fn write_topics(&self, content: &str) -> Result<()> {
        if self.fail_topics {
            return Err(anyhow!("repository unavailable"));
        }
        self.inner.write_topics(content).await
    }
}

/// Topic store whose first read blocks until its gate is notified.
pub struct GatedTopics {
    inner: JsonTopicStore,
    armed: AtomicBool,
    gate: Arc<Notify>,
}

impl GatedTopics {
    pub fn new(inner: JsonTopicStore) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            gate: Arc::new(Notify::new()),
        }
    }

    pub fn gate(&self) -> Arc<Notify> {
        self.gate.clone()
    }
}

#[async_trait]
impl TopicStore for GatedTopics {
    async fn load_topics(&self) -> Result<Vec<Topic>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.load_topics().await
    }

    async fn save_topics(&self, topics: &[Topic]) -> Result<()> {
        self.inner.save_topics(topics).await
    }
}

pub struct UnreadablePosts;

#[async_trait]
impl PostStore for UnreadablePosts {
    async fn all_posts(&self) -> Result<Vec<Post>> {
        Err(anyhow!("posts directory unavailable"))
    }
}

pub struct UnreadableTopics;

#[async_trait]
impl TopicStore for UnreadableTopics {
    async fn load_topics(&self) -> Result<Vec<Topic>> {
        Err(anyhow!("permission denied"))
    }

    async fn save_topics(&self, _topics: &[Topic]) -> Result<()> {
        Err(anyhow!("permission denied"))
    }
}

/// Temp directory with a topics file, a posts directory and recording mocks.
pub struct Harness {
    pub dir: TempDir,
    pub images: ScriptedImages,
    pub text: RecordingText,
    pub indexer: RecordingIndexer,
}

impl Harness {
    pub fn new(topics: &[Topic]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("blog")).unwrap();
        std::fs::write(
            dir.path().join("blog-topics.json"),
            serialize_topics(topics).unwrap(),
        )
        .unwrap();
        Self {
            dir,
            images: ScriptedImages::default(),
            text: RecordingText::default(),
            indexer: RecordingIndexer::default(),
        }
    }

    pub fn posts_dir(&self) -> PathBuf {
        self.dir.path().join("blog")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    pub fn flaky_sink(&self) -> FlakySink {
        FlakySink::new(self.posts_dir(), self.images_dir())
    }

    pub fn topic_store(&self) -> JsonTopicStore {
        JsonTopicStore::new(self.dir.path().join("blog-topics.json"))
    }

    pub fn post_store(&self) -> MdxPostStore {
        MdxPostStore::new(self.posts_dir(), "강남임플란트치과")
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            image_count: 3,
            image_throttle: Throttle::none(),
            site_base_url: SITE.to_string(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            topics: Arc::new(self.topic_store()),
            posts: Arc::new(self.post_store()),
            images: Arc::new(self.images.clone()),
            text: Arc::new(self.text.clone()),
            sink: Arc::new(LocalSink::new(self.posts_dir(), self.images_dir())),
            indexer: Arc::new(self.indexer.clone()),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.collaborators(), self.settings())
    }

    pub fn orchestrator_with_sink(&self, sink: Arc<dyn PublishSink>) -> Orchestrator {
        let deps = Collaborators {
            sink,
            ..self.collaborators()
        };
        Orchestrator::new(deps, self.settings())
    }

    pub async fn stored_topics(&self) -> Vec<Topic> {
        self.topic_store().load_topics().await.unwrap()
    }

    pub fn post_exists(&self, slug: &str) -> bool {
        self.posts_dir().join(format!("{}.mdx", slug)).exists()
    }
}
