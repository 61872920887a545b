//! GitHub repository search client
//!
//! Queries the REST search endpoint and maps repository items to [`Repository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{check_status, FetchExecutor, FetchParams, Provider, ProviderData, Repository};
use crate::error::FetchError;

/// Base URL for the GitHub repository search API
const GITHUB_SEARCH_URL: &str = "https://api.github.com/search/repositories";

/// Search qualifier used when the caller gives no query
const DEFAULT_QUERY: &str = "stars:>1000";

/// GitHub rejects requests without a user agent
const USER_AGENT: &str = concat!("pulsegate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<RepositoryItem>,
}

#[derive(Debug, Deserialize)]
struct RepositoryItem {
    full_name: String,
    description: Option<String>,
    html_url: String,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    updated_at: Option<DateTime<Utc>>,
}

/// Client for GitHub repository search
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http_client: Client,
    base_url: String,
    /// Personal access token; raises the search quota when present
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a new unauthenticated GitHubClient
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
            base_url: GITHUB_SEARCH_URL.to_string(),
            token: None,
        }
    }

    /// Sets the access token sent as a bearer credential
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Overrides the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the `q` search expression from query and language filters
    fn search_expression(params: &FetchParams) -> String {
        let mut expression = params.get("query").unwrap_or(DEFAULT_QUERY).to_string();
        if let Some(language) = params.get("language") {
            expression.push_str(&format!(" language:{}", language));
        }
        expression
    }

    fn parse_response(body: &str) -> Result<Vec<Repository>, FetchError> {
        let response: SearchResponse = serde_json::from_str(body)?;
        Ok(response
            .items
            .into_iter()
            .map(|item| Repository {
                full_name: item.full_name,
                description: item.description,
                url: item.html_url,
                language: item.language,
                stars: item.stargazers_count,
                forks: item.forks_count,
                updated_at: item.updated_at,
            })
            .collect())
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchExecutor for GitHubClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn fetch(&self, params: &FetchParams) -> Result<ProviderData, FetchError> {
        let limit = params.limit().unwrap_or(super::DEFAULT_LIMIT);
        let query = [
            ("q", Self::search_expression(params)),
            ("sort", params.get("sort").unwrap_or("stars").to_string()),
            ("order", "desc".to_string()),
            ("per_page", limit.to_string()),
        ];

        let mut request = self
            .http_client
            .get(&self.base_url)
            .query(&query)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let body = check_status(request.send().await?)?.text().await?;
        Ok(ProviderData::Repositories(Self::parse_response(&body)?))
    }
}
