//! Integration tests for CLI argument handling
//!
//! Runs the binary for commands that need no network access.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_pulsegate"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute pulsegate")
}

/// Writes a config file and returns its directory (kept alive by the caller)
fn config_file(contents: &str) -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pulsegate"), "Help should mention pulsegate");
    assert!(stdout.contains("fetch-all"), "Help should list fetch-all");
    assert!(stdout.contains("health"), "Help should list health");
}

#[test]
fn test_invalid_provider_prints_error_and_exits() {
    let output = run_cli(&["fetch", "myspace"]);
    assert!(!output.status.success(), "Expected invalid provider to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid provider"),
        "Should print error message about invalid provider: {}",
        stderr
    );
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_health_prints_json_report() {
    let (_dir, path) = config_file("max_retries = 1\n");
    let output = run_cli(&["--config", &path, "health"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "healthy");
    assert_eq!(report["score"], 100);
    assert_eq!(report["per_provider"].as_object().unwrap().len(), 3);
}

#[test]
fn test_health_single_provider() {
    let (_dir, path) = config_file("");
    let output = run_cli(&["--config", &path, "health", "gh"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let per_provider = report["per_provider"].as_object().unwrap();
    assert_eq!(per_provider.len(), 1);
    assert!(per_provider.contains_key("github"));
}

#[test]
fn test_invalid_config_file_fails() {
    let (_dir, path) = config_file("cache_max_size = 0\n");
    let output = run_cli(&["--config", &path, "health"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cache_max_size"), "{}", stderr);
}

#[test]
fn test_missing_config_file_fails() {
    let output = run_cli(&["--config", "/nonexistent/pulsegate.toml", "health"]);
    assert!(!output.status.success());
}

#[test]
fn test_fetch_without_token_and_fallback_disabled_is_configuration_error() {
    // Product Hunt needs a token; without one no request is attempted
    let (_dir, path) = config_file("fallback_enabled = false\nmax_retries = 0\n");
    let output = Command::new(env!("CARGO_BIN_EXE_pulsegate"))
        .args(["--config", &path, "fetch", "ph"])
        .env("RUST_LOG", "off")
        .env_remove("PRODUCT_HUNT_TOKEN")
        .output()
        .expect("Failed to execute pulsegate");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("credentials"), "{}", stderr);
}

#[test]
fn test_fetch_without_token_serves_seed_data() {
    let (_dir, path) = config_file("max_retries = 0\n");
    let output = Command::new(env!("CARGO_BIN_EXE_pulsegate"))
        .args(["--config", &path, "fetch", "ph", "-p", "limit=3"])
        .env("RUST_LOG", "off")
        .env_remove("PRODUCT_HUNT_TOKEN")
        .output()
        .expect("Failed to execute pulsegate");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["source"], "seed");
    assert_eq!(result["degraded"], true);
    assert_eq!(result["data"]["kind"], "launches");
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use pulsegate::cli::{parse_param, parse_provider_arg, Cli, CliError, Request};
    use pulsegate::Provider;

    #[test]
    fn test_cli_fetch_collects_params() {
        let cli = Cli::parse_from(["pulsegate", "fetch", "github", "-p", "language=rust", "-p", "sort=stars"]);
        match Request::from_cli(&cli).unwrap() {
            Request::Fetch { provider, params } => {
                assert_eq!(provider, Provider::GitHub);
                assert_eq!(params.get("language"), Some("rust"));
                assert_eq!(params.get("sort"), Some("stars"));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_parse_provider_arg_hn_returns_hacker_news() {
        assert_eq!(parse_provider_arg("hn").unwrap(), Provider::HackerNews);
    }

    #[test]
    fn test_parse_param_rejects_missing_equals() {
        assert!(matches!(parse_param("limit"), Err(CliError::InvalidParam(_))));
    }

    #[test]
    fn test_fetch_all_with_invalid_provider_is_error() {
        let cli = Cli::parse_from(["pulsegate", "fetch-all", "hn", "bogus"]);
        assert!(Request::from_cli(&cli).is_err());
    }
}
