//! Error taxonomy for registration and dispatch.
//!
//! Three families are kept apart on purpose:
//!
//! - [`ConfigError`] is fatal and raised while the registry is built or while a URL is
//!   generated from a route. It is never turned into a per-request response.
//! - [`DispatchError`] is raised while a request runs. [`DispatchError::is_user_facing`]
//!   splits it into expected conditions (not found, forbidden, user errors) and system
//!   failures, which are reported exactly once before being converted to a response.
//! - [`UserError`] is the expected failure a controller raises on bad input.

use crate::pattern::PatternError;
use crate::response::Response;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Default status for a [`UserError`] that does not carry one.
pub const DEFAULT_USER_ERROR_STATUS: u16 = 400;

/// An expected failure, shown to the caller and never logged as a system fault.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct UserError {
    /// Human readable message
    pub message: String,
    /// Optional status code (HTTP status; CLI responses always exit with 1)
    pub code: Option<u16>,
    /// Translation domain the message belongs to
    pub domain: Option<String>,
    /// Structured details (e.g. per-field validation reports)
    pub reports: Option<Value>,
}

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            domain: None,
            reports: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_reports(mut self, reports: Value) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Status code, defaulting to 400 when none was given.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self.code {
            Some(code) if (100..600).contains(&code) => code,
            _ => DEFAULT_USER_ERROR_STATUS,
        }
    }
}

/// Any condition raised between route resolution and the end of `post_run`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route matched, or a named resource does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// An access restriction rejected the route
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Raised intentionally by a controller
    #[error(transparent)]
    User(#[from] UserError),
    /// Anything unexpected
    #[error(transparent)]
    System(#[from] anyhow::Error),
    /// A controller aborting from deep inside its logic with a ready response
    #[error("response forced: {reason}")]
    Forced {
        reason: String,
        response: Box<Response>,
    },
}

impl DispatchError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::User(UserError::new(message))
    }

    /// Abort the lifecycle and answer with `response` as-is.
    pub fn force(reason: impl Into<String>, response: Response) -> Self {
        Self::Forced {
            reason: reason.into(),
            response: Box::new(response),
        }
    }

    /// True for expected conditions that must never reach the system error reporter.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::System(_))
    }

    /// Status code the condition maps to on the HTTP surface.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::User(e) => e.status(),
            Self::System(_) => 500,
            Self::Forced { response, .. } => response.code(),
        }
    }

    /// Short kind label used in logs and error layout lookup.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not-found",
            Self::Forbidden(_) => "forbidden",
            Self::User(_) => "user",
            Self::System(_) => "system",
            Self::Forced { .. } => "forced",
        }
    }

    /// View of this error as a user error, synthesizing one for not-found and forbidden.
    #[must_use]
    pub fn as_user_error(&self) -> Option<UserError> {
        match self {
            Self::User(e) => Some(e.clone()),
            Self::NotFound(what) => Some(UserError::new(format!("Not found: {what}")).with_code(404)),
            Self::Forbidden(what) => {
                Some(UserError::new(format!("Forbidden: {what}")).with_code(403))
            }
            Self::System(_) | Self::Forced { .. } => None,
        }
    }
}

impl From<ConfigError> for DispatchError {
    fn from(e: ConfigError) -> Self {
        Self::System(e.into())
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        Self::System(e.into())
    }
}

/// Fatal registration and URL generation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("route \"{route}\": {source}")]
    Pattern {
        route: String,
        #[source]
        source: PatternError,
    },

    #[error("route \"{route}\" is missing required field \"{field}\"")]
    MissingField { route: String, field: &'static str },

    #[error("route \"{route}\" declares unknown method(s): {}", methods.join(", "))]
    UnknownMethod { route: String, methods: Vec<String> },

    #[error("route \"{route}\" references unknown controller \"{controller}\"")]
    UnknownController { route: String, controller: String },

    #[error("route \"{route}\" declares unregistered access restriction \"{restriction}\"")]
    UnknownRestriction { route: String, restriction: String },

    #[error("route \"{route}\" declares unknown output \"{output}\"")]
    UnknownOutput { route: String, output: String },

    #[error("route \"{route}\" declares invalid parameter \"{parameter}\": {reason}")]
    InvalidParameter {
        route: String,
        parameter: String,
        reason: String,
    },

    #[error("route \"{route}\" conflicts with an existing registration: {reason}")]
    Conflict { route: String, reason: String },

    #[error("route \"{route}\" has an invalid definition: {source}")]
    Definition {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown route \"{0}\"")]
    UnknownRoute(String),

    #[error("route \"{route}\" is not registered on the {expected} surface")]
    WrongSurface { route: String, expected: &'static str },

    #[error("unknown route provider \"{0}\"")]
    UnknownProvider(String),

    #[error("route \"{route}\": generated URL \"{url}\" is invalid: {source}")]
    InvalidUrl {
        route: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) fn pattern(route: &str, source: PatternError) -> Self {
        Self::Pattern {
            route: route.to_string(),
            source,
        }
    }
}
