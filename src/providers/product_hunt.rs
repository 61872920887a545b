//! Product Hunt GraphQL client
//!
//! Requests recent posts from the v2 GraphQL API and flattens the
//! edge/node structure into [`Launch`] values. The API requires a developer
//! token; without one every call fails with [`FetchError::MissingCredentials`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{check_status, FetchExecutor, FetchParams, Launch, Provider, ProviderData};
use crate::error::FetchError;

/// Product Hunt GraphQL endpoint
const PRODUCT_HUNT_URL: &str = "https://api.producthunt.com/v2/api/graphql";

/// Look-back window when `days` is not given
const DEFAULT_DAYS: i64 = 1;

const POSTS_QUERY: &str = r#"
query Posts($first: Int!, $postedAfter: DateTime, $topic: String) {
  posts(first: $first, order: VOTES, postedAfter: $postedAfter, topic: $topic) {
    edges {
      node {
        id
        name
        tagline
        url
        votesCount
        commentsCount
        createdAt
        topics(first: 5) { edges { node { name } } }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PostsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PostsData {
    posts: Connection<PostNode>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostNode {
    id: String,
    name: String,
    #[serde(default)]
    tagline: String,
    url: String,
    #[serde(default)]
    votes_count: u32,
    #[serde(default)]
    comments_count: u32,
    created_at: Option<DateTime<Utc>>,
    topics: Option<Connection<TopicNode>>,
}

#[derive(Debug, Deserialize)]
struct TopicNode {
    name: String,
}

/// Client for the Product Hunt launch board
#[derive(Debug, Clone)]
pub struct ProductHuntClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl ProductHuntClient {
    /// Creates a client that authenticates with `token`
    pub fn new(token: Option<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: PRODUCT_HUNT_URL.to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Overrides the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds GraphQL variables for the posts query
    fn variables(params: &FetchParams, now: DateTime<Utc>) -> serde_json::Value {
        let limit = params.limit().unwrap_or(super::DEFAULT_LIMIT);
        let days = params
            .get("days")
            .and_then(|d| d.parse::<i64>().ok())
            .unwrap_or(DEFAULT_DAYS);
        let posted_after = now - Duration::days(days);

        json!({
            "first": limit,
            "postedAfter": posted_after.to_rfc3339(),
            "topic": params.get("topic"),
        })
    }

    fn parse_response(body: &str) -> Result<Vec<Launch>, FetchError> {
        let response: GraphQlResponse = serde_json::from_str(body)?;

        let data = match response.data {
            Some(data) => data,
            None => {
                let messages: Vec<String> =
                    response.errors.into_iter().map(|e| e.message).collect();
                return Err(FetchError::Parse(format!(
                    "GraphQL response without data: {}",
                    messages.join("; ")
                )));
            }
        };

        Ok(data
            .posts
            .edges
            .into_iter()
            .map(|edge| {
                let post = edge.node;
                let topics = post
                    .topics
                    .map(|t| t.edges.into_iter().map(|e| e.node.name).collect())
                    .unwrap_or_default();
                Launch {
                    id: post.id,
                    name: post.name,
                    tagline: post.tagline,
                    url: post.url,
                    votes: post.votes_count,
                    comments: post.comments_count,
                    topics,
                    launched_at: post.created_at,
                }
            })
            .collect())
    }
}

#[async_trait]
impl FetchExecutor for ProductHuntClient {
    fn provider(&self) -> Provider {
        Provider::ProductHunt
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch(&self, params: &FetchParams) -> Result<ProviderData, FetchError> {
        let token = self.token.as_ref().ok_or(FetchError::MissingCredentials)?;

        let body = json!({
            "query": POSTS_QUERY,
            "variables": Self::variables(params, Utc::now()),
        });

        let response = self
            .http_client
            .post(&self.base_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let text = check_status(response)?.text().await?;

        Ok(ProviderData::Launches(Self::parse_response(&text)?))
    }
}
