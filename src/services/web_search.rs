use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::util::truncate_chars;

const MAX_TOPIC_CHARS: usize = 60;
const MAX_SNIPPET_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Outcome of a best-effort context lookup. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Vec<SearchHit>),
    Empty,
    Failed(String),
}

#[allow(async_fn_in_trait)]
pub trait ContextLookup {
    async fn lookup(&self, topic: &str, count: usize) -> Lookup;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

/// Web search client used to enrich reports with outside context.
pub struct WebSearch {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn search(&self, topic: &str, count: usize) -> Result<Vec<SearchHit>> {
        let query = truncate_chars(topic, MAX_TOPIC_CHARS);
        let mut request = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .query(&[("q", query.to_string()), ("count", count.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header("X-Subscription-Token", key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: SearchResponse = response.json().await?;
        Ok(hits_from(body, count))
    }
}

fn hits_from(body: SearchResponse, count: usize) -> Vec<SearchHit> {
    body.web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .take(count)
        .map(|r| SearchHit {
            snippet: truncate_chars(&r.description, MAX_SNIPPET_CHARS).to_string(),
            url: r.url,
            title: r.title,
        })
        .collect()
}

impl ContextLookup for WebSearch {
    async fn lookup(&self, topic: &str, count: usize) -> Lookup {
        match self.search(topic, count).await {
            Ok(hits) if hits.is_empty() => Lookup::Empty,
            Ok(hits) => Lookup::Found(hits),
            Err(e) => {
                tracing::debug!("Web search for {:?} failed: {}", topic, e);
                Lookup::Failed(e.to_string())
            }
        }
    }
}
