use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Candidate content topic as stored in the topic list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: u32,
    pub target_keyword: String,
    #[serde(default)]
    pub search_volume: String,
    #[serde(default)]
    pub seo_difficulty: String,
    pub title: String,
    #[serde(default)]
    pub search_intent: String,
    pub category: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub slug: Option<String>,
    /// Fields this crate does not interpret; kept so whole-file rewrites are lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Topic {
    /// Record publication. Sets all three fields together so a published topic
    /// always carries a slug and a date.
    pub fn mark_published(&mut self, slug: &str, at: DateTime<Utc>) {
        self.published = true;
        self.slug = Some(slug.to_string());
        self.scheduled_date = Some(at);
    }

    /// Return the topic to the generation queue.
    pub fn mark_unpublished(&mut self) {
        self.published = false;
        self.slug = None;
        self.scheduled_date = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Published post as read back from the post store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub category: String,
    pub published_at: String,
    pub featured_image: String,
    pub author: String,
    pub faq: Vec<FaqEntry>,
    pub content: String,
}

/// Internal link candidate handed to the text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedPost {
    pub title: String,
    pub slug: String,
}

impl RelatedPost {
    pub fn markdown_link(&self) -> String {
        format!("- [{}](/blog/{})", self.title, self.slug)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicFailure {
    pub topic: String,
    pub error: String,
}

/// Outcome of one orchestrator run. Only failed topics are listed in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<TopicFailure>,
}

impl BatchResult {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, topic: &str, error: String) {
        self.failure_count += 1;
        self.errors.push(TopicFailure {
            topic: topic.to_string(),
            error,
        });
    }

    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count == 0
    }
}

/// JSON summary printed by the batch trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub posts_generated: usize,
    pub failed: usize,
    pub errors: Vec<TopicFailure>,
    pub timestamp: DateTime<Utc>,
}

impl BatchReport {
    pub fn new(result: &BatchResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            posts_generated: result.success_count,
            failed: result.failure_count,
            errors: result.errors.clone(),
            timestamp,
        }
    }
}
