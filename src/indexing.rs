//! Search-engine indexing notifications.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::Config;

const INDEXING_API_BASE: &str = "https://indexing.googleapis.com/";
const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CREDENTIALS_ENV: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
/// Refresh cached access tokens this long before they expire.
const TOKEN_SKEW_SECS: i64 = 60;

#[async_trait]
pub trait Indexer: Send + Sync {
    /// Announce that `url` was created or updated.
    async fn notify(&self, url: &str) -> Result<()>;
}

/// Used when indexing is not configured.
#[derive(Debug, Clone, Default)]
pub struct NoopIndexer;

#[async_trait]
impl Indexer for NoopIndexer {
    async fn notify(&self, url: &str) -> Result<()> {
        info!(%url, "indexing disabled; skipping notification");
        Ok(())
    }
}

/// Fields of a service-account key file this client needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid service account JSON")
    }

    /// Inline JSON from the environment wins over the key file.
    pub async fn load(path: &Path) -> Result<Self> {
        if let Some(raw) = std::env::var(CREDENTIALS_ENV).ok().filter(|v| !v.trim().is_empty()) {
            match Self::from_json(&raw) {
                Ok(key) => return Ok(key),
                Err(err) => warn!(?err, "ignoring unparseable {}", CREDENTIALS_ENV),
            }
        }
        let raw = tokio::fs::read_to_string(path).await.with_context(|| {
            format!(
                "no service account credentials ({} unset, {} unreadable)",
                CREDENTIALS_ENV,
                path.display()
            )
        })?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Indexing API client authenticated with a service-account JWT grant.
/// Access tokens are cached until shortly before expiry.
#[derive(Clone)]
pub struct GoogleIndexer {
    http: Client,
    base_url: Url,
    key: ServiceAccountKey,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl fmt::Debug for GoogleIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleIndexer")
            .field("base_url", &self.base_url)
            .field("client_email", &self.key.client_email)
            .finish_non_exhaustive()
    }
}

impl GoogleIndexer {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let base_url = Url::parse(INDEXING_API_BASE).context("invalid indexing API URL")?;
        Self::with_base_url(key, base_url)
    }

    pub fn with_base_url(key: ServiceAccountKey, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("autopost/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            key,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Signed RS256 assertion for the JWT-bearer token grant.
    pub fn build_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: INDEXING_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("invalid service account private key")?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("failed to sign token assertion")
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(TOKEN_SKEW_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.build_assertion(now)?;
        let res = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("failed to reach token endpoint")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("token exchange failed {}: {}", status, body));
        }
        let token: TokenResponse = res.json().await.context("invalid token response")?;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }

    pub fn build_publish_request(&self, token: &str, url: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v3/urlNotifications:publish")
            .context("invalid indexing API base URL")?;
        self.http
            .post(endpoint)
            .bearer_auth(token)
            .json(&json!({ "url": url, "type": "URL_UPDATED" }))
            .build()
            .context("failed to build indexing request")
    }

    /// Latest notification metadata the search engine holds for `url`.
    #[instrument(skip(self))]
    pub async fn url_status(&self, url: &str) -> Result<Value> {
        let token = self.access_token().await?;
        let endpoint = self
            .base_url
            .join("v3/urlNotifications/metadata")
            .context("invalid indexing API base URL")?;
        let res = self
            .http
            .get(endpoint)
            .query(&[("url", url)])
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to reach indexing API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("indexing status error {}: {}", status, body));
        }
        res.json().await.context("invalid indexing status response")
    }
}

#[async_trait]
impl Indexer for GoogleIndexer {
    #[instrument(skip(self))]
    async fn notify(&self, url: &str) -> Result<()> {
        let token = self.access_token().await?;
        let request = self.build_publish_request(&token, url)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach indexing API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("indexing API error {}: {}", status, body));
        }
        info!(%url, "indexing notification accepted");
        Ok(())
    }
}

/// Real client when `indexing` is configured, otherwise a no-op.
pub async fn indexer_from_config(cfg: &Config) -> Result<Arc<dyn Indexer>> {
    match &cfg.indexing {
        Some(indexing) => {
            let key = ServiceAccountKey::load(Path::new(&indexing.credentials_path)).await?;
            Ok(Arc::new(GoogleIndexer::new(key)?))
        }
        None => Ok(Arc::new(NoopIndexer)),
    }
}
