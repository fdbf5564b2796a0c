use super::core::Surface;
use super::registry::RouteRegistry;
use crate::error::ConfigError;
use crate::pattern::PathValues;
use serde_json::{Map, Value};
use url::Url;

/// Base used to validate relative URLs when the web root has no scheme.
const VALIDATION_BASE: &str = "http://localhost";

/// Reverse routing: route name + values → URL (HTTP) or command line (CLI).
#[derive(Debug, Clone, Copy)]
pub struct UrlGenerator<'a> {
    registry: &'a RouteRegistry,
    web_root: &'a str,
    cli_root_command: &'a str,
}

impl<'a> UrlGenerator<'a> {
    #[must_use]
    pub fn new(registry: &'a RouteRegistry, web_root: &'a str, cli_root_command: &'a str) -> Self {
        Self {
            registry,
            web_root,
            cli_root_command,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &'a RouteRegistry {
        self.registry
    }

    /// URL of HTTP route `name`, anchored at the web root.
    ///
    /// # Errors
    ///
    /// Unknown route, a missing or invalid value (naming the variable), or a result that does
    /// not parse as a URL.
    pub fn url<V: PathValues + ?Sized>(&self, name: &str, values: &V) -> Result<String, ConfigError> {
        self.url_with_query::<V, &str, &str>(name, values, &[])
    }

    /// Like [`UrlGenerator::url`], appending a form-encoded query string.
    ///
    /// # Errors
    ///
    /// See [`UrlGenerator::url`].
    pub fn url_with_query<V, K, Q>(
        &self,
        name: &str,
        values: &V,
        query: &[(K, Q)],
    ) -> Result<String, ConfigError>
    where
        V: PathValues + ?Sized,
        K: AsRef<str>,
        Q: AsRef<str>,
    {
        let route = self
            .registry
            .get(Surface::Http, name)
            .ok_or_else(|| ConfigError::UnknownRoute(name.to_string()))?;
        let path = route
            .pattern()
            .format_encoded(values)
            .map_err(|e| ConfigError::pattern(name, e))?;

        let mut url = String::with_capacity(self.web_root.len() + path.len());
        url.push_str(self.web_root.trim_end_matches('/'));
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(
                &url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(query.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
                    .finish(),
            );
        }

        validate_url(&url).map_err(|source| ConfigError::InvalidUrl {
            route: name.to_string(),
            url: url.clone(),
            source,
        })?;
        Ok(url)
    }

    /// Command line invoking CLI route `name`.
    ///
    /// Values naming path variables are substituted; the others become `--key=value` flags.
    ///
    /// # Errors
    ///
    /// Unknown route or a missing/invalid path value.
    pub fn command(&self, name: &str, values: &Map<String, Value>) -> Result<String, ConfigError> {
        let route = self
            .registry
            .get(Surface::Cli, name)
            .ok_or_else(|| ConfigError::UnknownRoute(name.to_string()))?;
        let path = route
            .pattern()
            .format(values)
            .map_err(|e| ConfigError::pattern(name, e))?;

        let mut command = String::new();
        if !self.cli_root_command.is_empty() {
            command.push_str(self.cli_root_command);
            command.push(' ');
        }
        command.push_str(&path);

        let variables = route.pattern().variables();
        for (key, value) in values {
            if variables.iter().any(|v| **v == **key) {
                continue;
            }
            command.push_str(" --");
            match value {
                Value::Bool(false) => {
                    command.push_str("not-");
                    command.push_str(key);
                }
                Value::Bool(true) | Value::Null => command.push_str(key),
                Value::String(s) => {
                    command.push_str(key);
                    command.push('=');
                    command.push_str(&shell_quote(s));
                }
                other => {
                    command.push_str(key);
                    command.push('=');
                    command.push_str(&shell_quote(&other.to_string()));
                }
            }
        }
        Ok(command)
    }
}

fn validate_url(url: &str) -> Result<Url, url::ParseError> {
    match Url::parse(url) {
        Ok(parsed) => Ok(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(VALIDATION_BASE)?.join(url),
        Err(e) => Err(e),
    }
}

fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@%+".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
