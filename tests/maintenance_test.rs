mod common;

use anyhow::anyhow;
use chrono::Utc;

use autopost::document::image_refs;
use autopost::maintenance::{
    regenerate_images, reset_topics, sync_topics_with_files, RegenerationSummary,
};
use autopost::throttle::Throttle;
use autopost::topics::TopicStore;

use common::*;

#[tokio::test]
async fn sync_picks_up_posts_written_outside_the_pipeline() {
    let h = Harness::new(&[
        topic(1, "임플란트 수명", "임플란트-기초"),
        topic(2, "임플란트 통증", "임플란트-기초"),
    ]);
    std::fs::write(
        h.posts_dir().join("7-임플란트-통증.mdx"),
        "---\ntitle: 통증\n---\n본문입니다.\n",
    )
    .unwrap();

    let store = h.topic_store();
    let mut topics = store.load_topics().await.unwrap();
    let slugs = h.post_store().post_slugs().await.unwrap();
    assert_eq!(sync_topics_with_files(&mut topics, &slugs, Utc::now()), 1);
    store.save_topics(&topics).await.unwrap();

    let stored = h.stored_topics().await;
    assert!(!stored[0].published);
    assert!(stored[1].published);
    assert_eq!(stored[1].slug.as_deref(), Some("7-임플란트-통증"));

    // The next batch only sees the remaining topic.
    let result = h
        .orchestrator()
        .run_batch(std::num::NonZeroUsize::new(5).unwrap())
        .await
        .unwrap();
    assert_eq!(result.attempted(), 1);
    let ids: Vec<u32> = h.text.requests().await.iter().map(|r| r.topic.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn reset_requeues_topics_for_generation() {
    let h = Harness::new(&[
        topic(1, "임플란트 수명", "임플란트-기초"),
        topic(2, "임플란트 통증", "임플란트-기초"),
        topic(3, "임플란트 가격", "임플란트-비용"),
    ]);
    h.orchestrator()
        .run_batch(std::num::NonZeroUsize::new(3).unwrap())
        .await
        .unwrap();

    let store = h.topic_store();
    let mut topics = store.load_topics().await.unwrap();
    assert_eq!(reset_topics(&mut topics, 1, Utc::now()), 1);
    store.save_topics(&topics).await.unwrap();

    let stored = h.stored_topics().await;
    assert!(stored[0].published);
    assert_eq!(stored[0].slug.as_deref(), Some("1-임플란트-수명"));
    assert!(stored[1..].iter().all(|t| !t.published && t.slug.is_none()));
}

#[tokio::test]
async fn regenerating_images_rewrites_featured_and_first_inline_image() {
    let mut h = Harness::new(&[]);
    std::fs::write(
        h.posts_dir().join("1-임플란트-수명.mdx"),
        "---\ntitle: 임플란트 수명\nkeywords:\n  - 임플란트\nfeaturedImage: /images/blog/old.webp\n---\n도입부\n\n![수명](/images/blog/old.webp)\n\n![관리](/images/blog/keep.webp)\n",
    )
    .unwrap();
    std::fs::write(
        h.posts_dir().join("2-임플란트-통증.mdx"),
        "---\ntitle: 임플란트 통증\n---\n그림 없는 본문입니다.\n",
    )
    .unwrap();
    let untouched = "---\ntitle: 임플란트 가격\nfeaturedImage: /images/blog/price.webp\n---\n![가격](/images/blog/price.webp)\n";
    std::fs::write(h.posts_dir().join("3-임플란트-가격.mdx"), untouched).unwrap();
    h.images = ScriptedImages::with_responses(vec![
        Ok("/images/blog/new-1.webp".into()),
        Ok("/images/blog/new-2.webp".into()),
        Err(anyhow!("rate limited")),
    ]);

    let summary = regenerate_images(&h.post_store(), &h.images, &Throttle::none())
        .await
        .unwrap();
    assert_eq!(
        summary,
        RegenerationSummary {
            updated: 2,
            failed: 1
        }
    );
    assert_eq!(
        h.images.calls().await,
        vec![
            ("임플란트 수명".to_string(), 0),
            ("임플란트 통증".to_string(), 0),
            ("임플란트 가격".to_string(), 0),
        ]
    );

    let store = h.post_store();
    let first = store.read_document("1-임플란트-수명").await.unwrap();
    assert_eq!(first.frontmatter.featured_image, "/images/blog/new-1.webp");
    assert_eq!(
        image_refs(&first.body),
        vec!["/images/blog/new-1.webp", "/images/blog/keep.webp"]
    );
    assert!(first.body.contains("![수명](/images/blog/new-1.webp)"));
    assert_eq!(first.frontmatter.keywords.joined(), "임플란트");

    let second = store.read_document("2-임플란트-통증").await.unwrap();
    assert_eq!(second.frontmatter.featured_image, "/images/blog/new-2.webp");
    assert!(image_refs(&second.body).is_empty());

    assert_eq!(
        std::fs::read_to_string(h.posts_dir().join("3-임플란트-가격.mdx")).unwrap(),
        untouched
    );
}
