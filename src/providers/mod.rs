//! Providers and their domain data
//!
//! This module contains the provider identifiers, the filter parameters callers
//! pass in, the per-provider domain types, and the [`FetchExecutor`] trait that
//! each provider client implements to turn a wire response into [`ProviderData`].

pub mod github;
pub mod hacker_news;
pub mod product_hunt;
pub mod seed;

pub use github::GitHubClient;
pub use hacker_news::HackerNewsClient;
pub use product_hunt::ProductHuntClient;
pub use seed::seed_data;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, ResilienceError};

/// Upper bound for the `limit` parameter accepted by every provider
pub const MAX_LIMIT: u32 = 100;

/// Default number of items requested when `limit` is absent
pub const DEFAULT_LIMIT: u32 = 20;

/// An external data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Launch board
    ProductHunt,
    /// Discussion board
    HackerNews,
    /// Code-repository search
    #[serde(rename = "github")]
    GitHub,
}

impl Provider {
    /// All providers, in fan-out order
    pub const ALL: [Provider; 3] = [Provider::ProductHunt, Provider::HackerNews, Provider::GitHub];

    /// Stable identifier used in config files, cache keys and tags
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::ProductHunt => "product_hunt",
            Provider::HackerNews => "hacker_news",
            Provider::GitHub => "github",
        }
    }

    /// Name of the single operation this provider serves
    pub fn operation(&self) -> &'static str {
        match self {
            Provider::ProductHunt => "launches",
            Provider::HackerNews => "stories",
            Provider::GitHub => "repositories",
        }
    }

    /// Parameter keys the provider understands
    pub fn accepted_params(&self) -> &'static [&'static str] {
        match self {
            Provider::ProductHunt => &["limit", "days", "topic"],
            Provider::HackerNews => &["limit", "query", "tags"],
            Provider::GitHub => &["limit", "query", "language", "sort"],
        }
    }

    /// Checks `params` for keys and values this provider cannot serve
    pub fn validate(&self, params: &FetchParams) -> Result<(), ResilienceError> {
        let accepted = self.accepted_params();
        if let Some(key) = params.keys().find(|k| !accepted.contains(k)) {
            return Err(ResilienceError::Configuration(format!(
                "parameter '{}' is not accepted by {} (expected one of: {})",
                key,
                self,
                accepted.join(", ")
            )));
        }

        params.limit()?;

        if let Some(days) = params.get("days") {
            match days.parse::<u32>() {
                Ok(d) if (1..=30).contains(&d) => {}
                _ => {
                    return Err(ResilienceError::Configuration(format!(
                        "days must be an integer between 1 and 30, got '{}'",
                        days
                    )))
                }
            }
        }

        if let Some(sort) = params.get("sort") {
            if !matches!(sort, "stars" | "forks" | "updated") {
                return Err(ResilienceError::Configuration(format!(
                    "sort must be one of stars, forks, updated, got '{}'",
                    sort
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "product_hunt" | "producthunt" | "ph" => Ok(Provider::ProductHunt),
            "hacker_news" | "hackernews" | "hn" => Ok(Provider::HackerNews),
            "github" | "gh" => Ok(Provider::GitHub),
            _ => Err(ResilienceError::Configuration(format!(
                "unknown provider '{}' (valid: product_hunt, hacker_news, github)",
                s
            ))),
        }
    }
}

/// Filter parameters for a provider operation
///
/// Keys are kept sorted so the serialized form is stable and can be used as
/// part of a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams(BTreeMap<String, String>);

impl FetchParams {
    /// Creates an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates over parameter keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Requested item count, defaulting to [`DEFAULT_LIMIT`]
    pub fn limit(&self) -> Result<u32, ResilienceError> {
        match self.get("limit") {
            None => Ok(DEFAULT_LIMIT),
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=MAX_LIMIT).contains(&n) => Ok(n),
                _ => Err(ResilienceError::Configuration(format!(
                    "limit must be an integer between 1 and {}, got '{}'",
                    MAX_LIMIT, raw
                ))),
            },
        }
    }

    /// Keeps only the keys `provider` accepts
    ///
    /// Used by fan-out requests, where one parameter set is shared by all
    /// providers and each one picks what it understands.
    pub fn for_provider(&self, provider: Provider) -> Self {
        let accepted = provider.accepted_params();
        Self(
            self.0
                .iter()
                .filter(|(k, _)| accepted.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Stable serialized form, e.g. `{"limit":"10","query":"rust"}`
    pub fn stable_key(&self) -> String {
        // BTreeMap<String, String> always serializes
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FetchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A product launch from the launch board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub id: String,
    pub name: String,
    pub tagline: String,
    pub url: String,
    pub votes: u32,
    pub comments: u32,
    pub topics: Vec<String>,
    pub launched_at: Option<DateTime<Utc>>,
}

/// A story from the discussion board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    /// Link target; text posts have none
    pub url: Option<String>,
    pub author: String,
    pub points: u32,
    pub comments: u32,
    pub created_at: Option<DateTime<Utc>>,
}

/// A repository from code search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// `owner/name`
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Data returned by a provider, one variant per provider domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ProviderData {
    Launches(Vec<Launch>),
    Stories(Vec<Story>),
    Repositories(Vec<Repository>),
}

impl ProviderData {
    /// The provider this data shape belongs to
    pub fn provider(&self) -> Provider {
        match self {
            ProviderData::Launches(_) => Provider::ProductHunt,
            ProviderData::Stories(_) => Provider::HackerNews,
            ProviderData::Repositories(_) => Provider::GitHub,
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        match self {
            ProviderData::Launches(items) => items.len(),
            ProviderData::Stories(items) => items.len(),
            ProviderData::Repositories(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Performs the network call for one provider
///
/// Implementations translate the provider's wire format into [`ProviderData`]
/// and report every failure as a [`FetchError`]. Timeouts are applied by the
/// caller, so implementations do not need their own.
#[async_trait]
pub trait FetchExecutor: Send + Sync {
    /// The provider this executor talks to
    fn provider(&self) -> Provider;

    /// Whether the credentials this executor needs are present
    fn is_configured(&self) -> bool {
        true
    }

    /// Fetches data for already-validated parameters
    async fn fetch(&self, params: &FetchParams) -> Result<ProviderData, FetchError>;
}

/// Maps an HTTP response to a [`FetchError::Status`] when it is not a success
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            code: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("hn".parse::<Provider>().unwrap(), Provider::HackerNews);
        assert_eq!("Product-Hunt".parse::<Provider>().unwrap(), Provider::ProductHunt);
        assert_eq!("GH".parse::<Provider>().unwrap(), Provider::GitHub);
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let err = "reddit".parse::<Provider>().unwrap_err();
        assert!(matches!(err, ResilienceError::Configuration(_)));
        assert!(err.to_string().contains("reddit"));
    }

    #[test]
    fn test_provider_serializes_as_identifier() {
        let json = serde_json::to_string(&Provider::GitHub).unwrap();
        assert_eq!(json, "\"github\"");
        let json = serde_json::to_string(&Provider::HackerNews).unwrap();
        assert_eq!(json, "\"hacker_news\"");
    }

    #[test]
    fn test_stable_key_is_order_independent() {
        let a = FetchParams::new().with("query", "rust").with("limit", "10");
        let b = FetchParams::new().with("limit", "10").with("query", "rust");
        assert_eq!(a.stable_key(), b.stable_key());
        assert_eq!(a.stable_key(), r#"{"limit":"10","query":"rust"}"#);
    }

    #[test]
    fn test_limit_defaults_and_bounds() {
        assert_eq!(FetchParams::new().limit().unwrap(), DEFAULT_LIMIT);
        assert_eq!(FetchParams::new().with("limit", "5").limit().unwrap(), 5);
        assert!(FetchParams::new().with("limit", "0").limit().is_err());
        assert!(FetchParams::new().with("limit", "101").limit().is_err());
        assert!(FetchParams::new().with("limit", "ten").limit().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_key() {
        let params = FetchParams::new().with("language", "rust");
        let err = Provider::HackerNews.validate(&params).unwrap_err();
        assert!(err.to_string().contains("language"));
        assert!(Provider::GitHub.validate(&params).is_ok());
    }

    #[test]
    fn test_validate_checks_values() {
        assert!(Provider::ProductHunt
            .validate(&FetchParams::new().with("days", "45"))
            .is_err());
        assert!(Provider::ProductHunt
            .validate(&FetchParams::new().with("days", "7"))
            .is_ok());
        assert!(Provider::GitHub
            .validate(&FetchParams::new().with("sort", "random"))
            .is_err());
    }

    #[test]
    fn test_for_provider_filters_keys() {
        let params = FetchParams::new()
            .with("limit", "10")
            .with("query", "rust")
            .with("language", "rust")
            .with("days", "3");

        let hn = params.for_provider(Provider::HackerNews);
        assert_eq!(hn.keys().collect::<Vec<_>>(), vec!["limit", "query"]);

        let ph = params.for_provider(Provider::ProductHunt);
        assert_eq!(ph.keys().collect::<Vec<_>>(), vec!["days", "limit"]);
    }

    #[test]
    fn test_provider_data_reports_its_provider() {
        assert_eq!(ProviderData::Launches(vec![]).provider(), Provider::ProductHunt);
        assert_eq!(ProviderData::Stories(vec![]).provider(), Provider::HackerNews);
        assert_eq!(ProviderData::Repositories(vec![]).provider(), Provider::GitHub);
        assert!(ProviderData::Stories(vec![]).is_empty());
    }

    #[test]
    fn test_provider_data_tagged_serialization() {
        let data = ProviderData::Stories(vec![Story {
            id: "1".to_string(),
            title: "Show HN".to_string(),
            url: None,
            author: "pg".to_string(),
            points: 10,
            comments: 2,
            created_at: None,
        }]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "stories");
        assert_eq!(json["items"][0]["title"], "Show HN");
    }
}
