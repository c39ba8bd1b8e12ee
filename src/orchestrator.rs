//! Batch generation: pick unpublished topics and drive each one through
//! images, text, persistence and the topic-store update.
use chrono::Utc;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{self, Config};
use crate::document::{split_frontmatter, strip_code_fence};
use crate::error::PipelineError;
use crate::images::{generate_post_images, ImageProvider, TogetherImageClient};
use crate::indexing::{indexer_from_config, Indexer, NoopIndexer};
use crate::model::{BatchResult, Topic};
use crate::posts::{MdxPostStore, PostStore};
use crate::publish::{sink_from_config, PublishSink, Publisher};
use crate::related::{format_links, select_related};
use crate::slug::derive_slug;
use crate::text::{AnthropicClient, GenerationRequest, TextProvider, TopicBrief};
use crate::throttle::Throttle;
use crate::topics::{self, JsonTopicStore, TopicStore};

/// External services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub topics: Arc<dyn TopicStore>,
    pub posts: Arc<dyn PostStore>,
    pub images: Arc<dyn ImageProvider>,
    pub text: Arc<dyn TextProvider>,
    pub sink: Arc<dyn PublishSink>,
    pub indexer: Arc<dyn Indexer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub image_count: usize,
    pub image_throttle: Throttle,
    pub site_base_url: String,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            image_count: cfg.app.image_count,
            image_throttle: Throttle::from_millis(cfg.app.image_delay_ms),
            site_base_url: cfg.site.base_url.clone(),
        }
    }
}

pub struct Orchestrator {
    topics: Arc<dyn TopicStore>,
    posts: Arc<dyn PostStore>,
    images: Arc<dyn ImageProvider>,
    text: Arc<dyn TextProvider>,
    indexer: Arc<dyn Indexer>,
    publisher: Publisher,
    settings: PipelineSettings,
    running: Mutex<()>,
}

impl Orchestrator {
    pub fn new(deps: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            publisher: Publisher::new(deps.topics.clone(), deps.sink),
            topics: deps.topics,
            posts: deps.posts,
            images: deps.images,
            text: deps.text,
            indexer: deps.indexer,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Wire the production clients. Missing indexing credentials only disable
    /// notifications; every other construction failure is returned.
    pub async fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let indexer = match indexer_from_config(cfg).await {
            Ok(indexer) => indexer,
            Err(err) => {
                warn!(?err, "indexing unavailable; notifications disabled");
                Arc::new(NoopIndexer)
            }
        };
        let sink = sink_from_config(cfg)?;
        let deps = Collaborators {
            topics: Arc::new(JsonTopicStore::new(&cfg.app.topics_path)),
            posts: Arc::new(MdxPostStore::new(&cfg.app.posts_dir, &cfg.site.author)),
            images: Arc::new(TogetherImageClient::from_config(cfg, sink.clone())?),
            text: Arc::new(AnthropicClient::from_config(cfg).await?),
            sink,
            indexer,
        };
        Ok(Self::new(deps, PipelineSettings::from_config(cfg)))
    }

    /// Process up to `count` unpublished topics in store order, one at a time.
    ///
    /// Per-topic failures are recorded in the returned [`BatchResult`]; only a
    /// failed topic-store read or an overlapping run fails the call itself.
    /// Pending index notifications are awaited before returning.
    #[instrument(skip(self))]
    pub async fn run_batch(&self, count: NonZeroUsize) -> Result<BatchResult, PipelineError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let all = self
            .topics
            .load_topics()
            .await
            .map_err(PipelineError::LoadTopics)?;
        let batch = topics::unpublished(&all, count.get());
        info!(
            requested = count.get(),
            selected = batch.len(),
            "starting batch"
        );

        let mut result = BatchResult::default();
        let mut notifications = JoinSet::new();
        for (n, topic) in batch.iter().enumerate() {
            info!(
                position = n + 1,
                total = batch.len(),
                topic_id = topic.id,
                title = %topic.title,
                "processing topic"
            );
            match self.process_topic(topic, &mut notifications).await {
                Ok(slug) => {
                    info!(topic_id = topic.id, %slug, "topic published");
                    result.record_success();
                }
                Err(err) => {
                    warn!(topic_id = topic.id, error = %err, "topic failed");
                    result.record_failure(&topic.title, err.to_string());
                }
            }
        }

        while let Some(joined) = notifications.join_next().await {
            if let Err(err) = joined {
                warn!(?err, "index notification task did not complete");
            }
        }

        info!(
            success = result.success_count,
            failed = result.failure_count,
            "batch finished"
        );
        Ok(result)
    }

    #[instrument(skip_all, fields(topic_id = topic.id, keyword = %topic.target_keyword))]
    async fn process_topic(
        &self,
        topic: &Topic,
        notifications: &mut JoinSet<()>,
    ) -> Result<String, PipelineError> {
        let keyword = topic.target_keyword.as_str();

        let image_refs = generate_post_images(
            self.images.as_ref(),
            keyword,
            self.settings.image_count,
            &self.settings.image_throttle,
        )
        .await;
        if image_refs.is_empty() {
            return Err(PipelineError::NoImages {
                keyword: keyword.to_string(),
            });
        }

        let related = match self.posts.all_posts().await {
            Ok(posts) => select_related(&posts, &topic.category),
            Err(err) => {
                warn!(?err, "related post lookup failed; continuing without links");
                Vec::new()
            }
        };

        let request = GenerationRequest {
            topic: TopicBrief::from(topic),
            image_refs,
            related_links: format_links(&related),
        };
        let raw = self
            .text
            .generate_document(&request)
            .await
            .map_err(PipelineError::TextGeneration)?;
        let content = strip_code_fence(&raw);
        if content.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        if split_frontmatter(&content).is_none() {
            warn!("generated document has no frontmatter block");
        }

        let slug = derive_slug(topic.id, keyword);
        self.publisher.persist_document(&slug, &content).await?;
        self.publisher
            .mark_published(topic.id, &slug, Utc::now())
            .await?;

        self.spawn_index_notification(notifications, &slug);
        Ok(slug)
    }

    fn spawn_index_notification(&self, notifications: &mut JoinSet<()>, slug: &str) {
        let indexer = self.indexer.clone();
        let url = config::post_url(&self.settings.site_base_url, slug);
        notifications.spawn(async move {
            if let Err(err) = indexer.notify(&url).await {
                warn!(?err, %url, "index notification failed");
            }
        });
    }
}
