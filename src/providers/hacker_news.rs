//! Hacker News client using the Algolia search API
//!
//! Fetches stories and maps Algolia hits to [`Story`] values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{check_status, FetchExecutor, FetchParams, Provider, ProviderData, Story};
use crate::error::FetchError;

/// Base URL for the Algolia Hacker News search API
const HN_SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search";

/// Tag filter applied when the caller does not supply one
const DEFAULT_TAGS: &str = "front_page";

/// Response from the Algolia search endpoint
#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

/// A single search hit
#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<u32>,
    num_comments: Option<u32>,
    created_at: Option<String>,
}

/// Client for the Hacker News discussion board
#[derive(Debug, Clone)]
pub struct HackerNewsClient {
    http_client: Client,
    base_url: String,
}

impl HackerNewsClient {
    /// Creates a new HackerNewsClient with default configuration
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Creates a new HackerNewsClient with a custom HTTP client
    pub fn with_client(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: HN_SEARCH_URL.to_string(),
        }
    }

    /// Overrides the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds query pairs for the search request
    fn query_pairs(params: &FetchParams) -> Vec<(&'static str, String)> {
        let limit = params.limit().unwrap_or(super::DEFAULT_LIMIT);
        let mut pairs = vec![
            ("tags", params.get("tags").unwrap_or(DEFAULT_TAGS).to_string()),
            ("hitsPerPage", limit.to_string()),
        ];
        if let Some(query) = params.get("query") {
            pairs.push(("query", query.to_string()));
        }
        pairs
    }

    /// Parses a search response body into stories
    fn parse_response(body: &str) -> Result<Vec<Story>, FetchError> {
        let response: SearchResponse = serde_json::from_str(body)?;
        Ok(response
            .hits
            .into_iter()
            // Comments and polls matched by loose tag filters carry no title
            .filter_map(|hit| {
                let title = hit.title?;
                Some(Story {
                    id: hit.object_id,
                    title,
                    url: hit.url.filter(|u| !u.is_empty()),
                    author: hit.author.unwrap_or_default(),
                    points: hit.points.unwrap_or(0),
                    comments: hit.num_comments.unwrap_or(0),
                    created_at: hit.created_at.as_deref().and_then(parse_timestamp),
                })
            })
            .collect())
    }
}

impl Default for HackerNewsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchExecutor for HackerNewsClient {
    fn provider(&self) -> Provider {
        Provider::HackerNews
    }

    async fn fetch(&self, params: &FetchParams) -> Result<ProviderData, FetchError> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&Self::query_pairs(params))
            .send()
            .await?;
        let body = check_status(response)?.text().await?;

        Ok(ProviderData::Stories(Self::parse_response(&body)?))
    }
}

/// Parses an RFC 3339 timestamp such as `2024-07-15T05:30:00.000Z`
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
