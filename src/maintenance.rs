//! Occasional repair jobs over the topic and post stores.
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::post_url;
use crate::document::{looks_truncated, replace_first_image, strip_code_fence};
use crate::images::ImageProvider;
use crate::indexing::Indexer;
use crate::model::{Post, Topic};
use crate::posts::MdxPostStore;
use crate::slug::{derive_slug, normalize_keyword};
use crate::text::TextProvider;
use crate::throttle::Throttle;

/// Mark unpublished topics as published when a post file whose slug contains
/// the normalized keyword already exists. Returns how many topics changed.
pub fn sync_topics_with_files(topics: &mut [Topic], slugs: &[String], now: DateTime<Utc>) -> usize {
    let mut updated = 0;
    for topic in topics.iter_mut().filter(|t| !t.published) {
        let needle = normalize_keyword(&topic.target_keyword);
        if needle.is_empty() {
            continue;
        }
        if let Some(slug) = slugs.iter().find(|s| s.contains(&needle)) {
            info!(topic_id = topic.id, %slug, "topic already has a post");
            topic.mark_published(slug, now);
            updated += 1;
        }
    }
    updated
}

/// Topics with `id <= published_through` become published (existing slug and
/// date are kept, missing ones backfilled); all others return to the queue.
/// Returns the number of published topics afterwards.
pub fn reset_topics(topics: &mut [Topic], published_through: u32, now: DateTime<Utc>) -> usize {
    let mut published = 0;
    for topic in topics.iter_mut() {
        if topic.id <= published_through {
            let slug = topic
                .slug
                .clone()
                .unwrap_or_else(|| derive_slug(topic.id, &topic.target_keyword));
            let at = topic.scheduled_date.unwrap_or(now);
            topic.mark_published(&slug, at);
            published += 1;
        } else {
            topic.mark_unpublished();
        }
    }
    published
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionSummary {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Find posts that were cut off and append a generated continuation.
#[instrument(skip_all, fields(dir = %store.dir().display()))]
pub async fn complete_truncated_posts(
    store: &MdxPostStore,
    text: &dyn TextProvider,
    throttle: &Throttle,
) -> Result<CompletionSummary> {
    let mut summary = CompletionSummary::default();
    let mut truncated = Vec::new();
    for slug in store.post_slugs().await? {
        summary.checked += 1;
        match store.read_document(&slug).await {
            Ok(doc) if looks_truncated(&doc.body) => truncated.push((slug, doc)),
            Ok(_) => {}
            Err(err) => warn!(?err, %slug, "skipping unreadable post"),
        }
    }
    info!(
        checked = summary.checked,
        truncated = truncated.len(),
        "scanned posts"
    );

    let total = truncated.len();
    for (n, (slug, mut doc)) in truncated.into_iter().enumerate() {
        match text
            .continue_document(&doc.frontmatter.title, &doc.body)
            .await
        {
            Ok(raw) => {
                let addition = strip_code_fence(&raw);
                if addition.trim().is_empty() {
                    warn!(%slug, "empty continuation");
                    summary.failed += 1;
                } else {
                    doc.body = format!("{}\n\n{}\n", doc.body.trim_end(), addition.trim());
                    match store.write_document(&slug, &doc).await {
                        Ok(()) => {
                            info!(%slug, "post completed");
                            summary.completed += 1;
                        }
                        Err(err) => {
                            warn!(?err, %slug, "failed to save completed post");
                            summary.failed += 1;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(?err, %slug, "continuation request failed");
                summary.failed += 1;
            }
        }
        if n + 1 < total {
            throttle.pause().await;
        }
    }
    Ok(summary)
}

/// Image subject for posts without a title.
const FALLBACK_IMAGE_SUBJECT: &str = "임플란트";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegenerationSummary {
    pub updated: usize,
    pub failed: usize,
}

/// Give every post a freshly generated featured image. The first inline
/// image, if any, is pointed at the new file too.
#[instrument(skip_all, fields(dir = %store.dir().display()))]
pub async fn regenerate_images(
    store: &MdxPostStore,
    images: &dyn ImageProvider,
    throttle: &Throttle,
) -> Result<RegenerationSummary> {
    let slugs = store.post_slugs().await?;
    let total = slugs.len();
    let mut summary = RegenerationSummary::default();
    for (n, slug) in slugs.iter().enumerate() {
        info!(position = n + 1, total, %slug, "regenerating image");
        match regenerate_post_image(store, images, slug).await {
            Ok(()) => summary.updated += 1,
            Err(err) => {
                warn!(?err, %slug, "image regeneration failed");
                summary.failed += 1;
            }
        }
        if n + 1 < total {
            throttle.pause().await;
        }
    }
    Ok(summary)
}

async fn regenerate_post_image(
    store: &MdxPostStore,
    images: &dyn ImageProvider,
    slug: &str,
) -> Result<()> {
    let mut doc = store.read_document(slug).await?;
    let subject = match doc.frontmatter.title.trim() {
        "" => FALLBACK_IMAGE_SUBJECT.to_string(),
        title => title.to_string(),
    };
    let image_ref = images.generate_image(&subject, 0).await?;
    match replace_first_image(&doc.body, &image_ref) {
        Some(body) => doc.body = body,
        None => info!(%slug, "no inline image; featured image only"),
    }
    doc.frontmatter.featured_image = image_ref;
    store.write_document(slug, &doc).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Notify the indexer about every post, pausing between requests.
#[instrument(skip_all, fields(posts = posts.len()))]
pub async fn index_all(
    posts: &[Post],
    indexer: &dyn Indexer,
    base_url: &str,
    throttle: &Throttle,
) -> IndexSummary {
    let mut summary = IndexSummary::default();
    for (n, post) in posts.iter().enumerate() {
        let url = post_url(base_url, &post.slug);
        match indexer.notify(&url).await {
            Ok(()) => summary.succeeded += 1,
            Err(err) => {
                warn!(?err, %url, "index notification failed");
                summary.failed += 1;
            }
        }
        if n + 1 < posts.len() {
            throttle.pause().await;
        }
    }
    summary
}
