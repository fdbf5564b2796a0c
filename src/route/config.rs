//! Route configuration sources.
//!
//! Route definitions are read from YAML files shaped like:
//!
//! ```yaml
//! require-packages:
//!   - blog
//! providers:
//!   - admin
//! http:
//!   home:
//!     path: /
//!     controller: home
//!     method: GET
//!   user_edit:
//!     path: /users/{int:id}/edit
//!     controller: user_edit
//!     method: [GET, POST]
//!     restrictTo:
//!       role: admin
//!     output: html
//! cli:
//!   cache_clear:
//!     path: cache-clear
//!     controller: cache_clear
//!     parameters:
//!       dry-run: ":bool"
//! ```
//!
//! Merging keeps the existing definition of a name. Names introduced by the added table are
//! ordered first, then the names only the existing table knows about.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One HTTP route definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRouteConfig {
    pub path: Option<String>,
    pub controller: Option<String>,
    /// A single verb, a `|`/`,` separated list, or a YAML sequence
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub method: Vec<String>,
    #[serde(default, rename = "restrictTo", skip_serializing_if = "Map::is_empty")]
    pub restrict_to: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Older spelling of `output`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Every other key, handed to the controller untouched
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl HttpRouteConfig {
    pub fn new(path: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            controller: Some(controller.into()),
            ..Self::default()
        }
    }

    /// Route served by the built-in redirect controller.
    pub fn redirect(path: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
        .with_option("redirect", Value::String(destination.into()))
    }

    /// Route served by the built-in static page controller.
    pub fn render(path: impl Into<String>, layout: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
        .with_option("render", Value::String(layout.into()))
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method.push(method.into());
        self
    }

    #[must_use]
    pub fn with_restriction(mut self, restriction: impl Into<String>, options: Value) -> Self {
        self.restrict_to.insert(restriction.into(), options);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// One CLI route definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliRouteConfig {
    pub path: Option<String>,
    pub controller: Option<String>,
    /// Long name → `[+][short][:type]`
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, rename = "restrictTo", skip_serializing_if = "Map::is_empty")]
    pub restrict_to: Map<String, Value>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl CliRouteConfig {
    pub fn new(path: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            controller: Some(controller.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, long: impl Into<String>, declaration: impl Into<String>) -> Self {
        self.parameters
            .insert(long.into(), Value::String(declaration.into()));
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Merged route definitions, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable {
    pub http: Vec<(String, HttpRouteConfig)>,
    pub cli: Vec<(String, CliRouteConfig)>,
}

impl RouteTable {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.cli.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.http.len() + self.cli.len()
    }

    pub fn add_http(&mut self, name: impl Into<String>, config: HttpRouteConfig) -> &mut Self {
        merge_entries(&mut self.http, vec![(name.into(), config)]);
        self
    }

    pub fn add_cli(&mut self, name: impl Into<String>, config: CliRouteConfig) -> &mut Self {
        merge_entries(&mut self.cli, vec![(name.into(), config)]);
        self
    }

    /// Merge `added` into this table; existing definitions of a name win.
    pub fn merge(&mut self, added: RouteTable) {
        merge_entries(&mut self.http, added.http);
        merge_entries(&mut self.cli, added.cli);
    }

    /// Parse one route file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Yaml`] for malformed YAML, [`ConfigError::Definition`] for an entry that
    /// is not a valid route definition.
    pub fn from_yaml(path: &Path, content: &str) -> Result<(Self, RouteFileExtras), ConfigError> {
        let raw: RawRouteFile = if content.trim().is_empty() {
            RawRouteFile::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };

        let mut table = Self::default();
        for (name, value) in raw.http.unwrap_or_default() {
            let config = serde_json::from_value(value).map_err(|source| {
                ConfigError::Definition {
                    route: name.clone(),
                    source,
                }
            })?;
            table.http.push((name, config));
        }
        for (name, value) in raw.cli.unwrap_or_default() {
            let config = serde_json::from_value(value).map_err(|source| {
                ConfigError::Definition {
                    route: name.clone(),
                    source,
                }
            })?;
            table.cli.push((name, config));
        }

        let extras = RouteFileExtras {
            requirements: raw
                .require_packages
                .unwrap_or_default()
                .into_iter()
                .filter_map(Requirement::into_name)
                .collect(),
            providers: raw.providers.unwrap_or_default(),
        };
        Ok((table, extras))
    }
}

/// Package requirements and provider keys found next to the route definitions of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFileExtras {
    pub requirements: Vec<String>,
    pub providers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRouteFile {
    http: Option<Map<String, Value>>,
    cli: Option<Map<String, Value>>,
    #[serde(rename = "require-packages")]
    require_packages: Option<Vec<Requirement>>,
    providers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Requirement {
    Name(String),
    Detailed { name: Option<String> },
}

impl Requirement {
    fn into_name(self) -> Option<String> {
        let name = match self {
            Self::Name(name) => Some(name),
            Self::Detailed { name } => name,
        };
        name.filter(|n| !n.trim().is_empty())
    }
}

fn merge_entries<T>(existing: &mut Vec<(String, T)>, added: Vec<(String, T)>) {
    let mut previous: Vec<Option<(String, T)>> =
        std::mem::take(existing).into_iter().map(Some).collect();
    let mut merged: Vec<(String, T)> = Vec::with_capacity(previous.len() + added.len());

    for (name, definition) in added {
        if merged.iter().any(|(n, _)| *n == name) {
            continue;
        }
        let kept = previous
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|(n, _)| *n == name))
            .and_then(Option::take);
        match kept {
            Some(entry) => merged.push(entry),
            None => merged.push((name, definition)),
        }
    }
    merged.extend(previous.into_iter().flatten());
    *existing = merged;
}

/// Programmatic contributor of routes, referenced by key from a `providers` list.
pub trait RouteProvider: Send + Sync {
    /// # Errors
    ///
    /// Any configuration error the provider runs into.
    fn routes(&self) -> Result<RouteTable, ConfigError>;
}

impl<F> RouteProvider for F
where
    F: Fn() -> RouteTable + Send + Sync,
{
    fn routes(&self) -> Result<RouteTable, ConfigError> {
        Ok(self())
    }
}

/// Where merged route definitions come from.
pub trait RouteConfigSource {
    /// # Errors
    ///
    /// I/O, parse, or provider failures; all fatal at startup.
    fn load(&self) -> Result<RouteTable, ConfigError>;
}

impl RouteConfigSource for RouteTable {
    fn load(&self) -> Result<RouteTable, ConfigError> {
        Ok(self.clone())
    }
}

/// Reads `routes.yaml` (and `routes_dev.yaml` in dev mode) for the application and for every
/// required package, expanding `require-packages` and `providers`.
///
/// Application files live in `routes_dir`; package `name` lives in `packages_dir/name`.
#[derive(Clone)]
pub struct DirectoryConfigSource {
    routes_dir: PathBuf,
    packages_dir: PathBuf,
    dev: bool,
    providers: HashMap<String, Arc<dyn RouteProvider>>,
}

impl DirectoryConfigSource {
    pub fn new(routes_dir: impl Into<PathBuf>, packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            routes_dir: routes_dir.into(),
            packages_dir: packages_dir.into(),
            dev: false,
            providers: HashMap::new(),
        }
    }

    /// Also load the optional `routes_dev` files.
    #[must_use]
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, key: impl Into<String>, provider: Arc<dyn RouteProvider>) -> Self {
        self.providers.insert(key.into(), provider);
        self
    }

    fn directory(&self, package: Option<&str>) -> PathBuf {
        match package {
            Some(name) => self.packages_dir.join(name),
            None => self.routes_dir.clone(),
        }
    }

    fn read_file(
        &self,
        package: Option<&str>,
        stem: &str,
        optional: bool,
    ) -> Result<Option<(RouteTable, RouteFileExtras)>, ConfigError> {
        let directory = self.directory(package);
        let candidates = [
            directory.join(format!("{stem}.yaml")),
            directory.join(format!("{stem}.yml")),
        ];
        let Some(path) = candidates.iter().find(|p| p.is_file()) else {
            if optional {
                return Ok(None);
            }
            return Err(ConfigError::Io {
                path: candidates[0].clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "route file not found"),
            });
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), package = ?package, "Route file read");
        RouteTable::from_yaml(path, &content).map(Some)
    }

    fn load_package(
        &self,
        package: Option<&str>,
        visited: &mut HashSet<String>,
    ) -> Result<RouteTable, ConfigError> {
        let mut own = RouteTable::default();
        let mut extras = RouteFileExtras::default();

        let files = [("routes", false), ("routes_dev", true)];
        for (stem, optional) in files {
            if stem == "routes_dev" && !self.dev {
                continue;
            }
            if let Some((table, file_extras)) = self.read_file(package, stem, optional)? {
                own.merge(table);
                extras.requirements.extend(file_extras.requirements);
                extras.providers.extend(file_extras.providers);
            }
        }

        let mut combined = RouteTable::default();
        for requirement in extras.requirements {
            // A package is loaded once, which also breaks requirement cycles
            if visited.insert(requirement.clone()) {
                combined.merge(self.load_package(Some(&requirement), visited)?);
            }
        }
        combined.merge(own);

        for key in extras.providers {
            let provider = self
                .providers
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownProvider(key.clone()))?;
            combined.merge(provider.routes()?);
        }
        Ok(combined)
    }
}

impl RouteConfigSource for DirectoryConfigSource {
    fn load(&self) -> Result<RouteTable, ConfigError> {
        let mut visited = HashSet::new();
        let table = self.load_package(None, &mut visited)?;
        info!(
            routes_dir = %self.routes_dir.display(),
            packages = visited.len(),
            http_routes = table.http.len(),
            cli_routes = table.cli.len(),
            dev = self.dev,
            "Route configuration loaded"
        );
        Ok(table)
    }
}
