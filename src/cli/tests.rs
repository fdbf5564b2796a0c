//! Unit tests for CLI commands

use crate::cli::{Cli, Commands};
use clap::Parser;

#[test]
fn test_exec_keeps_route_flags() {
    let cli = Cli::try_parse_from([
        "brrtdispatch",
        "exec",
        "cache/clear",
        "--all",
        "-vv",
        "extra",
    ])
    .unwrap();

    match cli.command {
        Commands::Exec { path, args } => {
            assert_eq!(path, "cache/clear");
            assert_eq!(args, vec!["--all", "-vv", "extra"]);
        }
        other => panic!("Expected Exec command, got {other:?}"),
    }
}

#[test]
fn test_serve_default_addr() {
    let cli = Cli::try_parse_from(["brrtdispatch", "serve"]).unwrap();
    match cli.command {
        Commands::Serve { addr } => assert_eq!(addr, "127.0.0.1:8080"),
        other => panic!("Expected Serve command, got {other:?}"),
    }
}

#[test]
fn test_url_collects_values_and_query() {
    let cli = Cli::try_parse_from([
        "brrtdispatch",
        "--config",
        "app.yaml",
        "url",
        "user_show",
        "--value",
        "id=42",
        "--query",
        "tab=posts",
    ])
    .unwrap();

    assert_eq!(cli.config.unwrap().to_string_lossy(), "app.yaml");
    match cli.command {
        Commands::Url {
            name,
            values,
            query,
            command,
        } => {
            assert_eq!(name, "user_show");
            assert_eq!(values, vec![("id".to_string(), "42".to_string())]);
            assert_eq!(query, vec![("tab".to_string(), "posts".to_string())]);
            assert!(!command);
        }
        other => panic!("Expected Url command, got {other:?}"),
    }
}

#[test]
fn test_url_rejects_malformed_value() {
    let result = Cli::try_parse_from(["brrtdispatch", "url", "home", "--value", "oops"]);
    assert!(result.is_err());
}
