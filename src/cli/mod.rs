//! # CLI Module
//!
//! Command-line front end of the `brrtdispatch` binary.
//!
//! ## Commands
//!
//! ### `exec`
//!
//! Dispatch a command through the CLI routes. Everything after the path is parsed as route
//! flags; piped stdin becomes the request input. The exit code is the response code.
//!
//! ```bash
//! brrtdispatch exec cache/clear --all -v
//! echo '{"id": 1}' | brrtdispatch exec import/users --dry-run
//! ```
//!
//! ### `serve`
//!
//! Serve the HTTP routes until SIGINT or SIGTERM:
//!
//! ```bash
//! brrtdispatch serve --addr 0.0.0.0:8080
//! ```
//!
//! ### `routes`
//!
//! ```bash
//! brrtdispatch routes
//! ```
//!
//! ### `url`
//!
//! ```bash
//! brrtdispatch url user_show --value id=42 --query tab=posts
//! brrtdispatch url cache_clear --command --value all=yes
//! ```
//!
//! Every command accepts `--config <FILE>` (or `BRRTD_CONFIG`); see
//! [`runtime_config`](crate::runtime_config) for the settings and their environment overrides.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands};
