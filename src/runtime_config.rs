//! # Runtime Configuration Module
//!
//! Application settings consumed by the dispatcher, the URL generator and the binary.
//!
//! Settings come from an optional YAML file and are then overridden by environment
//! variables. Every field has a default, so an empty file (or no file at all) is valid.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `BRRTD_CONFIG` | path of the YAML file read by [`AppConfig::load`] |
//! | `BRRTD_DEBUG` | `debug` |
//! | `BRRTD_DEV` | `dev` |
//! | `BRRTD_WEB_ROOT` | `web_root` |
//! | `BRRTD_DEFAULT_ROUTE` | `default_route` |
//! | `BRRTD_FORBIDDEN_TO_HOME` | `forbidden_to_home` |
//! | `BRRTD_CHECK_ACCESS` | `check_access` |
//! | `BRRTD_ROUTES_DIR` | `routes_dir` |
//! | `BRRTD_PACKAGES_DIR` | `packages_dir` |
//! | `BRRTD_LAYOUTS_DIR` | `layouts_dir` |
//! | `BRRTD_CLI_ROOT_COMMAND` | `cli_root_command` |
//!
//! ## Example
//!
//! ```yaml
//! debug: false
//! web_root: https://example.com/app
//! default_route: home
//! forbidden_to_home: true
//! routes_dir: config
//! layouts_dir: layouts
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "BRRTD_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Render system errors with full diagnostics
    pub debug: bool,
    /// Also load `routes_dev.yaml`
    pub dev: bool,
    /// Absolute root every generated URL starts with
    pub web_root: String,
    /// Route name used for "home" redirects
    pub default_route: String,
    /// Redirect forbidden HTML requests to the default route instead of a 403 page
    pub forbidden_to_home: bool,
    /// Evaluate route access restrictions
    pub check_access: bool,
    pub routes_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub layouts_dir: PathBuf,
    /// Command prefix used when generating CLI invocations
    pub cli_root_command: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            dev: false,
            web_root: "http://localhost:8080".to_string(),
            default_route: "home".to_string(),
            forbidden_to_home: false,
            check_access: true,
            routes_dir: PathBuf::from("config"),
            packages_dir: PathBuf::from("packages"),
            layouts_dir: PathBuf::from("layouts"),
            cli_root_command: "brrtdispatch exec".to_string(),
        }
    }
}

impl AppConfig {
    /// Read a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by `BRRTD_*` variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// File named by `BRRTD_CONFIG` (or `path` when given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let base = match path.map(Path::to_path_buf).or(from_env) {
            Some(file) => Self::from_file(file)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| lookup(key).map(|v| parse_flag(&v));
        if let Some(v) = flag("BRRTD_DEBUG") {
            self.debug = v;
        }
        if let Some(v) = flag("BRRTD_DEV") {
            self.dev = v;
        }
        if let Some(v) = flag("BRRTD_FORBIDDEN_TO_HOME") {
            self.forbidden_to_home = v;
        }
        if let Some(v) = flag("BRRTD_CHECK_ACCESS") {
            self.check_access = v;
        }
        if let Some(v) = lookup("BRRTD_WEB_ROOT") {
            self.web_root = v;
        }
        if let Some(v) = lookup("BRRTD_DEFAULT_ROUTE") {
            self.default_route = v;
        }
        if let Some(v) = lookup("BRRTD_ROUTES_DIR") {
            self.routes_dir = v.into();
        }
        if let Some(v) = lookup("BRRTD_PACKAGES_DIR") {
            self.packages_dir = v.into();
        }
        if let Some(v) = lookup("BRRTD_LAYOUTS_DIR") {
            self.layouts_dir = v.into();
        }
        if let Some(v) = lookup("BRRTD_CLI_ROOT_COMMAND") {
            self.cli_root_command = v;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.debug);
        assert!(config.check_access);
        assert_eq!(config.default_route, "home");
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debug: true\nweb_root: https://example.com/app").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(config.debug);
        assert_eq!(config.web_root, "https://example.com/app");
        assert_eq!(config.layouts_dir, PathBuf::from("layouts"));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debug: [not, a, bool").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BRRTD_DEBUG", "yes"),
            ("BRRTD_CHECK_ACCESS", "0"),
            ("BRRTD_DEFAULT_ROUTE", "index"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert!(config.debug);
        assert!(!config.check_access);
        assert_eq!(config.default_route, "index");
    }
}
