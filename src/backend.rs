use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Leaning {
    Left,
    Right,
    #[default]
    Neutral,
    #[serde(other)]
    Unknown,
}

impl Leaning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leaning::Left => "left",
            Leaning::Right => "right",
            Leaning::Neutral => "neutral",
            Leaning::Unknown => "unknown",
        }
    }

    /// Polarized labels gate the recommendation trigger; neutral and
    /// unknown ones do not.
    pub fn is_polarized(&self) -> bool {
        matches!(self, Leaning::Left | Leaning::Right)
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Leaning::Left => "bias-left",
            Leaning::Right => "bias-right",
            Leaning::Neutral => "bias-neutral",
            Leaning::Unknown => "bias-unknown",
        }
    }
}

/// Normalized classifier result. Both the single and the batched
/// response shapes reduce to this; semantics beyond shape are opaque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label {
    pub leaning: Leaning,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendRequest {
    pub user_id: String,
    pub title: String,
    pub post: String,
    pub label: Leaning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendResponse {
    #[serde(default)]
    pub bias_detected: bool,
    #[serde(default)]
    pub bias: Option<Leaning>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub url: String,
    #[serde(default, alias = "bias")]
    pub leaning: Leaning,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedRequest {
    pub user_id: String,
    pub subreddit: String,
    pub label: Leaning,
    pub title: String,
    pub post: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedPost {
    pub title: String,
    pub url: String,
    #[serde(default, alias = "bias")]
    pub leaning: Leaning,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: Leaning,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    results: Vec<ClassifyResponse>,
}

#[derive(Debug, Deserialize)]
struct RelatedResponse {
    #[serde(default)]
    related_posts: Vec<RelatedPost>,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    texts: &'a [&'a str],
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn classify(&self, text: &str) -> Result<Label> {
        let resp = self.post_json("classify", &ClassifyRequest { text })?;
        let payload: ClassifyResponse = resp.json().context("backend: decode classify response")?;
        Ok(Label {
            leaning: payload.label,
            confidence: payload.confidence,
        })
    }

    /// Wraps a single text in a one-element batch and unwraps the first
    /// result. The request and response shapes stay `{texts: [...]}` /
    /// `{results: [...]}` so real batching can slot in later.
    pub fn classify_batched(&self, text: &str) -> Result<Label> {
        let texts = [text];
        let resp = self.post_json("classify_batch", &BatchRequest { texts: &texts })?;
        let payload: BatchResponse = resp.json().context("backend: decode batch response")?;
        let first = payload
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("backend: batch response empty"))?;
        Ok(Label {
            leaning: first.label,
            confidence: first.confidence,
        })
    }

    /// `None` means the backend answered 204: no threshold reached, no
    /// UI change.
    pub fn recommend(&self, request: &RecommendRequest) -> Result<Option<RecommendResponse>> {
        let resp = self.post_json("api/recommend", request)?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let payload: RecommendResponse =
            resp.json().context("backend: decode recommend response")?;
        Ok(Some(payload))
    }

    pub fn related(&self, request: &RelatedRequest) -> Result<Vec<RelatedPost>> {
        let resp = self.post_json("api/related", request)?;
        let payload: RelatedResponse = resp.json().context("backend: decode related response")?;
        Ok(payload.related_posts)
    }

    fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let url = self.base_url.join(path)?;
        let resp = self
            .http
            .post(url.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .json(body)
            .send()
            .with_context(|| format!("backend: request {url}"))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            Err(anyhow!("backend: api error {}: {}", status, text))
        }
    }
}
