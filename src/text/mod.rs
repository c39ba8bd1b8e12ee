use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::model::Topic;

pub mod prompt;

pub use prompt::PromptContext;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/";
const SEO_RULES_FILE: &str = "seo-writing-rules.md";
const SOURCE_MATERIAL_FILE: &str = "source-material.md";

/// Topic fields the text provider writes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBrief {
    pub id: u32,
    pub target_keyword: String,
    pub title: String,
    pub category: String,
    pub search_intent: String,
}

impl From<&Topic> for TopicBrief {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id,
            target_keyword: topic.target_keyword.clone(),
            title: topic.title.clone(),
            category: topic.category.clone(),
            search_intent: topic.search_intent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub topic: TopicBrief,
    pub image_refs: Vec<String>,
    /// Markdown list items, `- [title](/blog/slug)`.
    pub related_links: Vec<String>,
}

#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Produce one complete MDX document (frontmatter + body). All or nothing.
    async fn generate_document(&self, request: &GenerationRequest) -> Result<String>;

    /// Produce the text to append to a post that was cut off.
    async fn continue_document(&self, title: &str, content: &str) -> Result<String>;
}

/// HTTP client for the messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    base_url: Url,
    api_key: String,
    version: String,
    model: String,
    max_tokens: u32,
    completion_max_tokens: u32,
    temperature: f32,
    context: PromptContext,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub fn new(cfg: &Config, context: PromptContext) -> Result<Self> {
        let base = if cfg.text.base_url.trim().is_empty() {
            ANTHROPIC_API_BASE
        } else {
            cfg.text.base_url.as_str()
        };
        let base_url = Url::parse(base).context("invalid text.base_url")?;
        let http = Client::builder()
            .user_agent("autopost/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key: cfg.text.api_key.clone(),
            version: cfg.text.version.clone(),
            model: cfg.text.model.clone(),
            max_tokens: cfg.text.max_tokens,
            completion_max_tokens: cfg.text.completion_max_tokens,
            temperature: cfg.text.temperature,
            context,
        })
    }

    /// Build a client with writing guidance read from `app.prompts_dir`.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let context =
            load_prompt_context(Path::new(&cfg.app.prompts_dir), &cfg.site.author).await?;
        Self::new(cfg, context)
    }

    pub fn build_request(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/messages")
            .context("invalid text API base URL")?;
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [ { "role": "user", "content": prompt } ],
        });
        self.http
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .context("failed to build text request")
    }

    async fn execute(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = self.build_request(prompt, max_tokens, temperature)?;
        info!(url = %request.url(), model = %self.model, max_tokens, "text API request");

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach text API")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by text API: {}", body);
            return Err(anyhow!("received 429 from text API: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Text API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("text API error {}: {}", status, body));
        }

        let payload: MessageResponse = res.json().await.context("invalid text API response JSON")?;
        if payload.stop_reason.as_deref() == Some("max_tokens") {
            warn!(max_tokens, "text API stopped at the token limit; output may be truncated");
        }
        let text = payload.text();
        info!(chars = text.chars().count(), "text API response");
        Ok(text)
    }
}

#[async_trait]
impl TextProvider for AnthropicClient {
    #[instrument(skip_all, fields(topic_id = request.topic.id))]
    async fn generate_document(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = prompt::build_generation_prompt(&self.context, request, Utc::now());
        self.execute(&prompt, self.max_tokens, self.temperature).await
    }

    #[instrument(skip_all, fields(title = %title))]
    async fn continue_document(&self, title: &str, content: &str) -> Result<String> {
        let prompt = prompt::build_completion_prompt(title, content);
        self.execute(&prompt, self.completion_max_tokens, 0.7).await
    }
}

/// Read the SEO rules and source material from `dir`.
pub async fn load_prompt_context(dir: &Path, author: &str) -> Result<PromptContext> {
    let seo_rules = read_prompt_file(&dir.join(SEO_RULES_FILE)).await?;
    let source_material = read_prompt_file(&dir.join(SOURCE_MATERIAL_FILE)).await?;
    Ok(PromptContext {
        seo_rules,
        source_material,
        author: author.to_string(),
    })
}

async fn read_prompt_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read prompt file: {}", path.display()))
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessageResponse {
    /// Text blocks joined by newlines; other block types are ignored.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.typ == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_config() -> Config {
        serde_yaml::from_str(crate::config::example()).unwrap()
    }

    #[test]
    fn build_request_sets_headers_and_body() {
        let client = AnthropicClient::new(&sample_config(), PromptContext::default()).unwrap();
        let request = client.build_request("hello", 8000, 0.5).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/messages");
        let headers = request.headers();
        assert_eq!(
            headers.get("x-api-key").and_then(|h| h.to_str().ok()).unwrap(),
            "YOUR_ANTHROPIC_API_KEY"
        );
        assert_eq!(
            headers
                .get("anthropic-version")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "2023-06-01"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["max_tokens"], 8000);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn joins_text_blocks_only() {
        let payload: MessageResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "---\ntitle: a" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "---\nbody" }
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(payload.text(), "---\ntitle: a\n---\nbody");
    }

    #[tokio::test]
    async fn loads_prompt_files() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join(SEO_RULES_FILE), "규칙").unwrap();
        std::fs::write(td.path().join(SOURCE_MATERIAL_FILE), "자료").unwrap();
        let ctx = load_prompt_context(td.path(), "저자").await.unwrap();
        assert_eq!(ctx.seo_rules, "규칙");
        assert_eq!(ctx.source_material, "자료");
        assert_eq!(ctx.author, "저자");
    }

    #[tokio::test]
    async fn missing_prompt_file_is_reported() {
        let td = tempdir().unwrap();
        let err = load_prompt_context(td.path(), "저자").await.unwrap_err();
        assert!(format!("{err:#}").contains(SEO_RULES_FILE));
    }
}
