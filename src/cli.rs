//! Command-line interface parsing for pulsegate
//!
//! Arguments are parsed with clap, then turned into a [`Request`] so provider
//! names and `key=value` parameters are validated before anything is fetched.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::providers::{FetchParams, Provider};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified provider name is not recognized
    #[error("Invalid provider: '{0}'. Valid providers: product_hunt (ph), hacker_news (hn), github (gh)")]
    InvalidProvider(String),

    /// A parameter is not of the form key=value
    #[error("Invalid parameter: '{0}'. Expected key=value")]
    InvalidParam(String),
}

/// Pulsegate - rate-limited, cached access to launch, discussion and code-search providers
#[derive(Parser, Debug)]
#[command(name = "pulsegate")]
#[command(about = "Fetch provider data through a rate limiter, cache and fallbacks")]
#[command(version)]
pub struct Cli {
    /// Config file to load instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch data from one provider
    ///
    /// Examples:
    ///   pulsegate fetch hn -p query=rust -p limit=5
    ///   pulsegate fetch github -p language=go -p sort=updated
    Fetch {
        /// product_hunt, hacker_news or github (ph, hn, gh)
        provider: String,

        /// Filter parameter, repeatable
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Fetch several providers concurrently (all of them by default)
    ///
    /// Each provider receives only the parameters it understands.
    FetchAll {
        /// Providers to fetch
        providers: Vec<String>,

        /// Filter parameter, repeatable
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Show quota, throttling and cache health
    Health {
        /// Limit the report to one provider
        provider: Option<String>,
    },
}

/// A validated command
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Fetch {
        provider: Provider,
        params: FetchParams,
    },
    FetchAll {
        providers: Vec<Provider>,
        params: FetchParams,
    },
    Health {
        provider: Option<Provider>,
    },
}

/// Parses a provider name or alias
pub fn parse_provider_arg(s: &str) -> Result<Provider, CliError> {
    s.parse()
        .map_err(|_| CliError::InvalidProvider(s.to_string()))
}

/// Parses a `key=value` parameter; the value may itself contain `=`
pub fn parse_param(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

fn parse_params(raw: &[String]) -> Result<FetchParams, CliError> {
    raw.iter()
        .map(|s| parse_param(s))
        .collect::<Result<Vec<_>, _>>()
        .map(|pairs| pairs.into_iter().collect())
}

impl Request {
    /// Validates parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        match &cli.command {
            Command::Fetch { provider, params } => Ok(Request::Fetch {
                provider: parse_provider_arg(provider)?,
                params: parse_params(params)?,
            }),
            Command::FetchAll { providers, params } => {
                let providers = if providers.is_empty() {
                    Provider::ALL.to_vec()
                } else {
                    providers
                        .iter()
                        .map(|p| parse_provider_arg(p))
                        .collect::<Result<Vec<_>, _>>()?
                };
                Ok(Request::FetchAll {
                    providers,
                    params: parse_params(params)?,
                })
            }
            Command::Health { provider } => Ok(Request::Health {
                provider: provider.as_deref().map(parse_provider_arg).transpose()?,
            }),
        }
    }
}
