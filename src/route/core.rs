use crate::datatype::CliArgument;
use crate::pattern::{ParamVec, PathPattern};
use crate::request::Request;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Methods a route accepts when its definition lists none.
pub const KNOWN_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

/// Transport a route is reachable from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Http,
    Cli,
}

impl Surface {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Cli => "cli",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response family a route answers with, used when converting errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Json,
    Cli,
}

impl OutputFormat {
    /// Parse a configured output name (`html`, `json`, `cli`), case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            "cli" | "text" => Some(Self::Cli),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Cli => "cli",
        }
    }
}

/// Surface-specific part of a route.
#[derive(Debug, Clone)]
pub enum RouteKind {
    /// Allowed verbs, never empty once registered
    Http { methods: Vec<Method> },
    /// Declared parameters, validated by the controller on demand
    Cli { arguments: Vec<CliArgument> },
}

/// An immutable route registration.
#[derive(Debug, Clone)]
pub struct Route {
    name: Arc<str>,
    pattern: PathPattern,
    kind: RouteKind,
    controller: String,
    restrictions: Vec<(String, Value)>,
    output: OutputFormat,
    options: Map<String, Value>,
}

impl Route {
    pub(crate) fn new(
        name: &str,
        pattern: PathPattern,
        kind: RouteKind,
        controller: String,
        restrictions: Vec<(String, Value)>,
        output: OutputFormat,
        options: Map<String, Value>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            pattern,
            kind,
            controller,
            restrictions,
            output,
            options,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared name handle, used when binding a request.
    #[must_use]
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    #[must_use]
    pub fn surface(&self) -> Surface {
        match self.kind {
            RouteKind::Http { .. } => Surface::Http,
            RouteKind::Cli { .. } => Surface::Cli,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &RouteKind {
        &self.kind
    }

    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    #[must_use]
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    /// Allowed verbs; empty for CLI routes.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        match &self.kind {
            RouteKind::Http { methods } => methods,
            RouteKind::Cli { .. } => &[],
        }
    }

    /// Declared parameters; empty for HTTP routes.
    #[must_use]
    pub fn arguments(&self) -> &[CliArgument] {
        match &self.kind {
            RouteKind::Cli { arguments } => arguments,
            RouteKind::Http { .. } => &[],
        }
    }

    #[must_use]
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.methods().contains(method)
    }

    /// Symbolic key of the controller factory this route instantiates.
    #[must_use]
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Access restrictions in declaration order.
    #[must_use]
    pub fn restrictions(&self) -> &[(String, Value)] {
        &self.restrictions
    }

    #[must_use]
    pub fn output(&self) -> OutputFormat {
        self.output
    }

    #[must_use]
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub(crate) fn add_methods(&mut self, added: &[Method]) {
        if let RouteKind::Http { methods } = &mut self.kind {
            for method in added {
                if !methods.contains(method) {
                    methods.push(method.clone());
                }
            }
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RouteKind::Http { methods } => {
                let methods: Vec<&str> = methods.iter().map(Method::as_str).collect();
                write!(
                    f,
                    "{} {} -> {} ({})",
                    methods.join("|"),
                    self.template(),
                    self.controller,
                    self.name
                )
            }
            RouteKind::Cli { .. } => {
                write!(f, "{} -> {} ({})", self.template(), self.controller, self.name)
            }
        }
    }
}

/// Something a request can be matched against.
pub trait Matchable {
    /// Bound path values when `request` is accepted.
    fn matches(&self, request: &Request) -> Option<ParamVec>;
}

impl Matchable for Route {
    fn matches(&self, request: &Request) -> Option<ParamVec> {
        match (&self.kind, request) {
            (RouteKind::Http { methods }, Request::Http(http)) => {
                // Method filter runs before the regex
                if !methods.contains(http.method()) {
                    return None;
                }
                self.pattern.match_path(http.path())
            }
            (RouteKind::Cli { .. }, Request::Cli(cli)) => self.pattern.match_path(cli.path()),
            _ => None,
        }
    }
}
