//! Static seed datasets
//!
//! Last-resort data served when a provider cannot be reached and nothing was
//! ever cached for the request. Entries are deliberately generic so a consumer
//! can still render something meaningful.

use super::{Launch, Provider, ProviderData, Repository, Story};

/// Returns the seed dataset for a provider
pub fn seed_data(provider: Provider) -> ProviderData {
    match provider {
        Provider::ProductHunt => ProviderData::Launches(seed_launches()),
        Provider::HackerNews => ProviderData::Stories(seed_stories()),
        Provider::GitHub => ProviderData::Repositories(seed_repositories()),
    }
}

fn seed_launches() -> Vec<Launch> {
    [
        ("seed-ph-1", "Notion", "All-in-one workspace", 1200, "Productivity"),
        ("seed-ph-2", "Linear", "Issue tracking built for speed", 980, "Developer Tools"),
        ("seed-ph-3", "Raycast", "Supercharged productivity launcher", 870, "Mac"),
    ]
    .into_iter()
    .map(|(id, name, tagline, votes, topic)| Launch {
        id: id.to_string(),
        name: name.to_string(),
        tagline: tagline.to_string(),
        url: format!("https://www.producthunt.com/products/{}", name.to_lowercase()),
        votes,
        comments: 0,
        topics: vec![topic.to_string()],
        launched_at: None,
    })
    .collect()
}

fn seed_stories() -> Vec<Story> {
    [
        ("seed-hn-1", "Show HN: A tiny resilient API gateway", 312),
        ("seed-hn-2", "Ask HN: How do you handle third-party rate limits?", 201),
        ("seed-hn-3", "The twelve-factor app", 155),
    ]
    .into_iter()
    .map(|(id, title, points)| Story {
        id: id.to_string(),
        title: title.to_string(),
        url: None,
        author: "pulsegate".to_string(),
        points,
        comments: 0,
        created_at: None,
    })
    .collect()
}

fn seed_repositories() -> Vec<Repository> {
    [
        ("rust-lang/rust", "Empowering everyone to build reliable and efficient software.", "Rust", 95_000),
        ("tokio-rs/tokio", "A runtime for writing reliable asynchronous applications with Rust.", "Rust", 27_000),
        ("serde-rs/serde", "Serialization framework for Rust", "Rust", 9_000),
    ]
    .into_iter()
    .map(|(full_name, description, language, stars)| Repository {
        full_name: full_name.to_string(),
        description: Some(description.to_string()),
        url: format!("https://github.com/{}", full_name),
        language: Some(language.to_string()),
        stars,
        forks: 0,
        updated_at: None,
    })
    .collect()
}
