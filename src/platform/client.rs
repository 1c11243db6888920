use std::fmt;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::Publication;

use super::Credentials;

/// Feed orderings offered by `GET /posts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Hot,
    New,
    Rising,
    Top,
}

impl SortOrder {
    pub const ALL: [SortOrder; 4] = [
        SortOrder::Hot,
        SortOrder::New,
        SortOrder::Rising,
        SortOrder::Top,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Hot => "hot",
            SortOrder::New => "new",
            SortOrder::Rising => "rising",
            SortOrder::Top => "top",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can hand back a page of raw post records.
#[allow(async_fn_in_trait)]
pub trait PostSource {
    async fn fetch_posts(
        &self,
        sort: SortOrder,
        limit: u32,
        submolt: Option<&str>,
    ) -> Result<Vec<serde_json::Value>>;
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<serde_json::Value>,
}

pub struct PlatformClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl PlatformClient {
    pub fn new(api_base: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("molt-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: credentials.api_key,
        })
    }

    /// Publish a report as a new post. Returns the API's JSON reply.
    pub async fn publish(&self, publication: &Publication) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/posts", self.api_base))
            .bearer_auth(&self.api_key)
            .json(publication)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::PlatformApi(format!(
                "publish failed: HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

impl PostSource for PlatformClient {
    async fn fetch_posts(
        &self,
        sort: SortOrder,
        limit: u32,
        submolt: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut query = vec![
            ("sort", sort.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(submolt) = submolt {
            query.push(("submolt", submolt.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/posts", self.api_base))
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(
                anyhow::anyhow!("Failed to fetch {} posts: HTTP {}", sort, response.status())
                    .into(),
            );
        }

        let body: PostsResponse = response.json().await?;
        tracing::debug!("Fetched {} {} posts", body.posts.len(), sort);
        Ok(body.posts)
    }
}
