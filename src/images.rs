//! Image generation: the provider seam, the per-post request loop and the
//! HTTP client for the image-generation API.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::publish::PublishSink;
use crate::throttle::Throttle;

const TOGETHER_API_BASE: &str = "https://api.together.xyz/";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static FILE_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9가-힣-]").expect("valid file name regex"));

/// Dental vocabulary used to turn Korean keywords into English prompt terms.
const TRANSLATIONS: [(&str, &str); 10] = [
    ("임플란트", "dental implant"),
    ("가격", "price consultation"),
    ("치과", "dental clinic"),
    ("강남", "Gangnam"),
    ("크라운", "dental crown"),
    ("보철", "dental prosthesis"),
    ("뼈이식", "bone graft"),
    ("교정", "orthodontic treatment"),
    ("미백", "teeth whitening"),
    ("치아", "teeth"),
];

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one image for `keyword` and return the reference embedded in posts.
    /// `index` selects the prompt variant.
    async fn generate_image(&self, keyword: &str, index: usize) -> Result<String>;
}

/// Request `count` images one after another, pausing between requests.
/// Individual failures are logged and skipped, so the result may be shorter
/// than `count` (or empty).
#[instrument(skip(provider, throttle))]
pub async fn generate_post_images(
    provider: &dyn ImageProvider,
    keyword: &str,
    count: usize,
    throttle: &Throttle,
) -> Vec<String> {
    let mut refs = Vec::with_capacity(count);
    for index in 0..count {
        match provider.generate_image(keyword, index).await {
            Ok(image_ref) => {
                info!(index, %image_ref, "image generated");
                refs.push(image_ref);
            }
            Err(err) => warn!(?err, index, "image generation failed; skipping"),
        }
        if index + 1 < count {
            throttle.pause().await;
        }
    }
    refs
}

/// Word-by-word translation of known Korean terms; unknown words pass through.
pub fn translate_keyword(keyword: &str) -> String {
    keyword
        .split(' ')
        .map(|term| {
            TRANSLATIONS
                .iter()
                .find(|(ko, _)| *ko == term)
                .map(|(_, en)| *en)
                .unwrap_or(term)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prompt for the `index`-th image; three variants rotate.
pub fn image_prompt(keyword: &str, index: usize) -> String {
    let subject = translate_keyword(keyword);
    match index % 3 {
        0 => format!(
            "Professional modern dental clinic interior, clean and bright, medical equipment, {}, welcoming atmosphere, high quality, photorealistic, 4k",
            subject
        ),
        1 => format!(
            "Dental professional consultation room showing {}, modern medical facility, clean environment, professional lighting, detailed, realistic",
            subject
        ),
        _ => format!(
            "Close-up view of {} in professional dental setting, medical equipment, sterile environment, high quality, photorealistic",
            subject
        ),
    }
}

/// `{keyword}-{timestamp_ms}-{index}.webp`, keeping only file-safe characters.
pub fn image_file_name(keyword: &str, timestamp_ms: i64, index: usize) -> String {
    let hyphenated = WHITESPACE.replace_all(keyword.trim(), "-");
    let safe = FILE_UNSAFE.replace_all(&hyphenated, "");
    format!("{}-{}-{}.webp", safe, timestamp_ms, index)
}

/// Decode provider output, crop-resize to the target size and encode as WebP.
pub fn encode_webp(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).context("provider returned undecodable image")?;
    let resized = decoded.resize_to_fill(width, height, FilterType::Lanczos3);
    let rgba = DynamicImage::ImageRgba8(resized.to_rgba8());
    let mut out = Cursor::new(Vec::new());
    rgba.write_to(&mut out, ImageFormat::WebP)
        .context("failed to encode WebP")?;
    Ok(out.into_inner())
}

/// HTTP client for the image-generation API. Generated files are handed to
/// the publish sink and referenced as `{url_prefix}/{file}`.
#[derive(Clone)]
pub struct TogetherImageClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
    width: u32,
    height: u32,
    steps: u32,
    output_size: (u32, u32),
    url_prefix: String,
    sink: Arc<dyn PublishSink>,
}

impl fmt::Debug for TogetherImageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TogetherImageClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("url_prefix", &self.url_prefix)
            .finish_non_exhaustive()
    }
}

impl TogetherImageClient {
    pub fn from_config(cfg: &Config, sink: Arc<dyn PublishSink>) -> Result<Self> {
        let base = if cfg.image.base_url.trim().is_empty() {
            TOGETHER_API_BASE
        } else {
            cfg.image.base_url.as_str()
        };
        let base_url = Url::parse(base).context("invalid image.base_url")?;
        let http = Client::builder()
            .user_agent("autopost/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key: cfg.image.api_key.clone(),
            model: cfg.image.model.clone(),
            width: cfg.image.width,
            height: cfg.image.height,
            steps: cfg.image.steps,
            output_size: (cfg.image.output_width, cfg.image.output_height),
            url_prefix: cfg.app.images_url_prefix.trim_end_matches('/').to_string(),
            sink,
        })
    }

    pub fn build_request(&self, prompt: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/images/generations")
            .context("invalid image API base URL")?;
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "width": self.width,
            "height": self.height,
            "steps": self.steps,
            "n": 1,
        });
        self.http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .context("failed to build image request")
    }

    /// Raw bytes of the first generated image, whether inlined or linked.
    async fn fetch_image_bytes(&self, prompt: &str) -> Result<Vec<u8>> {
        let request = self.build_request(prompt)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach image API")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from image API: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("image API error {}: {}", status, body));
        }

        let payload: Value = res.json().await.context("invalid image API response JSON")?;
        match parse_image_payload(&payload)? {
            ImagePayload::Base64(data) => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .context("invalid base64 image data"),
            ImagePayload::Url(url) => {
                info!(%url, "fetching generated image");
                let res = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .context("failed to download generated image")?;
                if !res.status().is_success() {
                    return Err(anyhow!("image download failed {}", res.status()));
                }
                Ok(res.bytes().await?.to_vec())
            }
        }
    }
}

#[async_trait]
impl ImageProvider for TogetherImageClient {
    #[instrument(skip(self))]
    async fn generate_image(&self, keyword: &str, index: usize) -> Result<String> {
        let prompt = image_prompt(keyword, index);
        info!(%prompt, "requesting image");
        let bytes = self.fetch_image_bytes(&prompt).await?;
        self.store_image(keyword, index, bytes).await
    }
}

impl TogetherImageClient {
    /// Convert raw provider output to WebP, write it through the sink and
    /// return the reference posts embed.
    pub async fn store_image(&self, keyword: &str, index: usize, raw: Vec<u8>) -> Result<String> {
        let (w, h) = self.output_size;
        let webp = tokio::task::spawn_blocking(move || encode_webp(&raw, w, h))
            .await
            .context("image encoder task failed")??;

        let file_name = image_file_name(keyword, chrono::Utc::now().timestamp_millis(), index);
        self.sink
            .write_image(&file_name, &webp)
            .await
            .with_context(|| format!("failed to store image {}", file_name))?;

        Ok(format!("{}/{}", self.url_prefix, file_name))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ImagePayload {
    Base64(String),
    Url(String),
}

#[derive(Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn parse_image_payload(payload: &Value) -> Result<ImagePayload> {
    let resp: GenerationResponse =
        serde_json::from_value(payload.clone()).context("unexpected image API response shape")?;
    let first = resp
        .data
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("image API returned no images"))?;
    if let Some(b64) = first.b64_json.filter(|s| !s.is_empty()) {
        return Ok(ImagePayload::Base64(b64));
    }
    if let Some(url) = first.url.filter(|s| !s.is_empty()) {
        return Ok(ImagePayload::Url(url));
    }
    Err(anyhow!("no image data received (neither b64_json nor url)"))
}
