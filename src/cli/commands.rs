use crate::app::Application;
use crate::request::CliRequest;
use crate::response::StdioTransport;
use crate::runtime_config::AppConfig;
use crate::server::{HttpServer, Stopper};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line interface for brrtdispatch
#[derive(Debug, Parser)]
#[command(name = "brrtdispatch", version)]
#[command(about = "Route registry and dispatcher for HTTP and CLI requests", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "BRRTD_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Dispatch a command through the CLI routes; exits with the response code
    Exec {
        /// Route path, e.g. `cache/clear`
        path: String,

        /// Flags and positional arguments passed to the route
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Serve the HTTP routes, one request at a time
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// List registered routes in registration order
    Routes,
    /// Generate the URL (or CLI command) of a named route
    Url {
        name: String,

        /// Path value, repeatable
        #[arg(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,

        /// Query parameter, repeatable
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Generate a CLI invocation instead of a URL
        #[arg(long, default_value_t = false)]
        command: bool,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got \"{raw}\""))
}

/// Run a parsed command line and return the process exit code.
///
/// # Errors
///
/// Configuration errors, an unbindable address, or a registry that fails to build.
pub fn run_cli(cli: Cli) -> anyhow::Result<u8> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let app = Application::new(config);

    match cli.command {
        Commands::Exec { path, args } => {
            let request = CliRequest::new(path, &args)
                .with_piped_input()
                .context("failed to read stdin")?;
            let mut transport = StdioTransport::new();
            let outcome = app
                .handle_cli(request, &mut transport)
                .context("failed to build the route registry")?;
            Ok(u8::try_from(outcome.code).unwrap_or(u8::MAX))
        }
        Commands::Serve { addr } => {
            let handle = HttpServer::new(Arc::new(app))
                .start(addr.as_str())
                .with_context(|| format!("failed to start the HTTP server on {addr}"))?;
            install_signal_handlers(handle.stopper())?;
            handle
                .join()
                .map_err(|e| anyhow!("HTTP server thread panicked: {e:?}"))?;
            Ok(0)
        }
        Commands::Routes => {
            let registry = app.registry().context("failed to build the route registry")?;
            for route in registry.routes() {
                println!("{route}");
            }
            Ok(0)
        }
        Commands::Url {
            name,
            values,
            query,
            command,
        } => {
            let urls = app.urls().context("failed to build the route registry")?;
            let generated = if command {
                let values: Map<String, Value> = values
                    .into_iter()
                    .chain(query)
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                urls.command(&name, &values)
            } else {
                urls.url_with_query(&name, &values, &query)
            }
            .with_context(|| format!("cannot generate \"{name}\""))?;
            println!("{generated}");
            Ok(0)
        }
    }
}

#[cfg(unix)]
fn install_signal_handlers(stopper: Stopper) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    std::thread::Builder::new()
        .name("brrtdispatch-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Shutdown signal received");
                stopper.stop();
            }
        })
        .context("failed to spawn the signal thread")?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_stopper: Stopper) -> anyhow::Result<()> {
    Ok(())
}
