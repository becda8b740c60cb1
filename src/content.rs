use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locator::FULLNAME_PREFIX;

pub const DEFAULT_CONTENT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("malformed post id")]
    MalformedId,
    #[error("post listing empty")]
    EmptyListing,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

/// Canonical full text of one post, fetched from the public content
/// API. Immutable after fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub subreddit: String,
}

impl PostContent {
    pub fn text(&self) -> String {
        let mut text = self.title.trim().to_string();
        let body = self.body.trim();
        if !body.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(body);
        }
        text
    }

    pub fn combined_len(&self) -> usize {
        self.title.trim().chars().count() + self.body.trim().chars().count()
    }
}

/// Public read client. No authentication: the `/comments/<id>.json`
/// endpoint serves the full post regardless of feed truncation.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("content client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_CONTENT_BASE.to_string()),
        })
    }

    /// One network read per identifier. Accepts either the `t3_<id>`
    /// fullname or the bare id.
    pub fn post_content(&self, id: &str) -> Result<PostContent> {
        let article = id.strip_prefix(FULLNAME_PREFIX).unwrap_or(id);
        if article.is_empty() || !article.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!(ContentError::MalformedId);
        }

        let url = format!("{}/comments/{}.json", self.base_url, article);
        let resp = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("content: request {url}"))?;

        if !resp.status().is_success() {
            bail!("content: status {} for {}", resp.status(), url);
        }

        let payload: Vec<Value> = resp.json().context("content: decode payload")?;
        parse_comments_payload(&payload)
    }
}

/// The comments endpoint returns a two-element array: the post listing
/// followed by the comment listing. Only the post is needed here.
fn parse_comments_payload(payload: &[Value]) -> Result<PostContent> {
    let first = payload
        .first()
        .ok_or_else(|| anyhow!("content: comments payload missing elements"))?;
    let listing: ListingEnvelope =
        serde_json::from_value(first.clone()).context("content: decode post listing")?;
    let post = listing
        .data
        .children
        .into_iter()
        .next()
        .map(|thing| thing.data)
        .ok_or(ContentError::EmptyListing)?;

    Ok(PostContent {
        title: post.title,
        body: post.selftext,
        subreddit: post.subreddit,
    })
}

#[derive(Debug, Deserialize)]
struct ListingEnvelope {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    subreddit: String,
}
