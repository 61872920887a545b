//! pulsegate - fetch launch, discussion and code-search data resiliently
//!
//! Prints JSON results on stdout. Logs go to stderr and are filtered with
//! `RUST_LOG` (default `pulsegate=info`).

use std::env;
use std::io;
use std::process;

use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pulsegate::cli::{Cli, Request};
use pulsegate::{Orchestrator, ResilienceConfig};

/// Sets up logging to stderr so stdout stays machine-readable
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulsegate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Loads the config file, then lets environment tokens override credentials
fn load_config(cli: &Cli) -> Result<ResilienceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ResilienceConfig::load(path)?,
        None => ResilienceConfig::load_default()?,
    };

    if let Some(token) = env_token("PRODUCT_HUNT_TOKEN") {
        config.credentials.product_hunt_token = Some(token);
    }
    if let Some(token) = env_token("GITHUB_TOKEN") {
        config.credentials.github_token = Some(token);
    }
    Ok(config)
}

fn env_token(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(orchestrator: &Orchestrator, request: Request) -> Result<(), Box<dyn std::error::Error>> {
    match request {
        Request::Fetch { provider, params } => {
            let result = orchestrator.fetch(provider, &params).await?;
            print_json(&result)
        }
        Request::FetchAll { providers, params } => {
            let result = orchestrator.fetch_all(&providers, &params).await;
            print_json(&result)
        }
        Request::Health { provider } => print_json(&orchestrator.health(provider)),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = try_main(Cli::parse()).await {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

async fn try_main(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let request = Request::from_cli(&cli)?;
    let config = load_config(&cli)?;
    debug!(?request, "starting");

    let orchestrator = Orchestrator::from_config(config)?;
    orchestrator.start();

    let outcome = run(&orchestrator, request).await;
    orchestrator.shutdown().await;
    outcome
}
