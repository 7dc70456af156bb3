//! Authenticated JSON-over-HTTP client shared by the cloud adapters

use crate::error::{AuditError, Result, TransientKind};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Request timeout for a single page
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stop following page tokens after this many pages
const MAX_PAGES: usize = 1000;

/// Supplies the bearer token attached to every request
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `None` sends the request unauthenticated
    async fn access_token(&self) -> Result<Option<String>>;
}

/// A fixed token, typically minted outside the process
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim();
        Self((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    /// Read the token from a file, ignoring surrounding whitespace
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read access token from {}", path.display()))?;
        if token.trim().is_empty() {
            anyhow::bail!("Access token file {} is empty", path.display());
        }
        Ok(Self::new(token))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = if self.0.is_some() { "<redacted>" } else { "<none>" };
        f.debug_tuple("StaticToken").field(&shown).finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Base URL of every backend API; override for testing or private endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub monitoring: String,
    pub run: String,
    pub functions: String,
    pub compute: String,
    pub sql: String,
    pub resource_manager: String,
    pub billing: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            monitoring: "https://monitoring.googleapis.com".into(),
            run: "https://run.googleapis.com".into(),
            functions: "https://cloudfunctions.googleapis.com".into(),
            compute: "https://compute.googleapis.com".into(),
            sql: "https://sqladmin.googleapis.com".into(),
            resource_manager: "https://cloudresourcemanager.googleapis.com".into(),
            billing: "https://cloudbilling.googleapis.com".into(),
        }
    }
}

impl Endpoints {
    /// Every API served from one base URL
    pub fn all(base: &str) -> Self {
        Self {
            monitoring: base.into(),
            run: base.into(),
            functions: base.into(),
            compute: base.into(),
            sql: base.into(),
            resource_manager: base.into(),
            billing: base.into(),
        }
    }
}

/// One page of a list response
pub trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// HTTP client with bearer auth and error mapping
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    token: Arc<dyn TokenSource>,
}

impl RestClient {
    pub fn new(token: Arc<dyn TokenSource>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http, token })
    }

    /// Join a base URL and an absolute path
    pub fn url(&self, base: &str, path: &str) -> Result<Url> {
        let raw = format!("{}{}", base.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| AuditError::Validation(format!("invalid URL {}: {}", raw, e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");

        let mut request = self.http.get(url.clone());
        if let Some(token) = self.token.access_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::from_status(status.as_u16(), error_message(&body)));
        }

        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body)
            .map_err(|e| AuditError::Unknown(format!("invalid response from {}: {}", url.path(), e)))
    }

    /// Follow `nextPageToken` until exhausted
    pub async fn list_all<P: Page>(&self, url: Url) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut page_url = url.clone();
            if let Some(token) = &page_token {
                page_url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: P = self.get_json(page_url).await?;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(items),
            }
        }

        warn!(url = %url, pages = MAX_PAGES, "Page limit reached, listing truncated");
        Ok(items)
    }
}

fn transport_error(err: reqwest::Error) -> AuditError {
    if err.is_timeout() {
        AuditError::transient(TransientKind::DeadlineExceeded, err.to_string())
    } else if err.is_connect() {
        AuditError::transient(TransientKind::Unavailable, err.to_string())
    } else {
        AuditError::Unknown(err.to_string())
    }
}

/// `error.message` of a JSON error body, else the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.trim().to_string(),
    }
}

/// Last path segment of a resource URL or name
pub fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// 64-bit integers arrive as JSON strings; accept numbers too
pub fn int_from_string<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}
