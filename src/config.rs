//! Configuration loader and validator for the blog autopost pipeline.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub site: Site,
    pub text: TextProvider,
    pub image: ImageProvider,
    #[serde(default)]
    pub github: Option<Github>,
    #[serde(default)]
    pub indexing: Option<Indexing>,
}

/// Paths, batch sizing and pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub topics_path: String,
    pub posts_dir: String,
    pub images_dir: String,
    pub images_url_prefix: String,
    pub prompts_dir: String,
    pub batch_size: usize,
    pub image_count: usize,
    pub image_delay_ms: u64,
    pub index_delay_ms: u64,
    pub completion_delay_ms: u64,
}

/// Public site identity used for canonical URLs and post authorship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub base_url: String,
    pub author: String,
}

/// Language-generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextProvider {
    pub api_key: String,
    pub base_url: String,
    pub version: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub completion_max_tokens: u32,
}

/// Image-generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageProvider {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub output_width: u32,
    pub output_height: u32,
}

/// Source-control hosting mirror; omitted means documents stay local only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Github {
    pub token: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub path_prefix: String,
}

/// Search-engine indexing; omitted means notifications are skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indexing {
    pub credentials_path: String,
}

fn default_github_api() -> String {
    "https://api.github.com/".to_string()
}

impl Config {
    /// Ensure required directories exist (data, posts and image output).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [&self.app.data_dir, &self.app.posts_dir, &self.app.images_dir] {
            if dir.trim().is_empty() {
                continue;
            }
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Canonical URL for a published post.
    pub fn post_url(&self, slug: &str) -> String {
        post_url(&self.site.base_url, slug)
    }

    /// Exclusive lock file guarding against concurrent batch runs.
    pub fn lock_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join("autopost.lock")
    }

    /// Overlay secrets and the site URL from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.text.api_key = key;
        }
        if let Some(key) = lookup("TOGETHER_API_KEY") {
            self.image.api_key = key;
        }
        if let Some(url) = lookup("SITE_URL") {
            self.site.base_url = url;
        }
        if let (Some(github), Some(token)) = (self.github.as_mut(), lookup("GITHUB_TOKEN")) {
            github.token = token;
        }
    }
}

/// Join the site base URL and a slug into `<base>/blog/<slug>`.
pub fn post_url(base_url: &str, slug: &str) -> String {
    format!("{}/blog/{}", base_url.trim_end_matches('/'), slug)
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let app = &cfg.app;
    if app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if app.topics_path.trim().is_empty() {
        return Err(ConfigError::Invalid("app.topics_path must be non-empty"));
    }
    if app.posts_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.posts_dir must be non-empty"));
    }
    if app.images_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.images_dir must be non-empty"));
    }
    if app.batch_size == 0 {
        return Err(ConfigError::Invalid("app.batch_size must be > 0"));
    }
    if app.image_count == 0 {
        return Err(ConfigError::Invalid("app.image_count must be > 0"));
    }
    // delays are u64; zero disables pacing

    match Url::parse(&cfg.site.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(ConfigError::Invalid("site.base_url must be an http(s) URL")),
    }

    if cfg.text.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("text.api_key must be non-empty"));
    }
    if cfg.text.model.trim().is_empty() {
        return Err(ConfigError::Invalid("text.model must be non-empty"));
    }
    if cfg.text.max_tokens == 0 || cfg.text.completion_max_tokens == 0 {
        return Err(ConfigError::Invalid("text token limits must be > 0"));
    }
    if !(0.0..=1.0).contains(&cfg.text.temperature) {
        return Err(ConfigError::Invalid("text.temperature must be within 0.0..=1.0"));
    }

    if cfg.image.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("image.api_key must be non-empty"));
    }
    if cfg.image.model.trim().is_empty() {
        return Err(ConfigError::Invalid("image.model must be non-empty"));
    }
    if cfg.image.output_width == 0 || cfg.image.output_height == 0 {
        return Err(ConfigError::Invalid("image output size must be non-zero"));
    }

    if let Some(github) = &cfg.github {
        if github.token.trim().is_empty() {
            return Err(ConfigError::Invalid("github.token must be non-empty"));
        }
        if github.owner.trim().is_empty() || github.repo.trim().is_empty() {
            return Err(ConfigError::Invalid("github.owner and github.repo must be non-empty"));
        }
        if github.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("github.branch must be non-empty"));
        }
    }

    if let Some(indexing) = &cfg.indexing {
        if indexing.credentials_path.trim().is_empty() {
            return Err(ConfigError::Invalid("indexing.credentials_path must be non-empty"));
        }
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  topics_path: "./content/blog-topics.json"
  posts_dir: "./content/blog"
  images_dir: "./public/images/blog"
  images_url_prefix: "/images/blog"
  prompts_dir: "./prompts"
  batch_size: 10
  image_count: 3
  image_delay_ms: 1000
  index_delay_ms: 500
  completion_delay_ms: 2000

site:
  base_url: "https://gangnamimplant.com"
  author: "강남임플란트치과"

text:
  api_key: "YOUR_ANTHROPIC_API_KEY"
  base_url: "https://api.anthropic.com/"
  version: "2023-06-01"
  model: "claude-sonnet-4-20250514"
  max_tokens: 8000
  temperature: 0.5
  completion_max_tokens: 2000

image:
  api_key: "YOUR_TOGETHER_API_KEY"
  base_url: "https://api.together.xyz/"
  model: "black-forest-labs/FLUX.1-schnell"
  width: 1024
  height: 768
  steps: 4
  output_width: 1200
  output_height: 900

github:
  token: "YOUR_GITHUB_TOKEN"
  owner: "funkyts"
  repo: "gangnamimplant"
  branch: "main"
  path_prefix: "gangnamimplant-blog"

indexing:
  credentials_path: "./service-account.json"
"#
}
