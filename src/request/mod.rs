//! # Request Module
//!
//! The two inbound request surfaces and the state shared between them.
//!
//! A [`Request`] is either an [`HttpRequest`] (method, path, query, headers, cookies, decoded
//! body) or a [`CliRequest`] (route path, parsed flags, positional arguments, piped stdin).
//! Once the dispatcher resolves a route, the route name and the values extracted from the
//! path are attached with [`Request::bind`]. A request can be bound exactly once.

mod cli_request;
mod http_request;
pub mod locale;

pub use cli_request::{parse_arguments, CliRequest, Verbosity};
pub use http_request::{parse_cookies, parse_query, HttpRequest, InputType, UploadedFile};
pub use locale::LocaleRouting;

use crate::error::DispatchError;
use crate::pattern::ParamVec;
use crate::route::Surface;
use once_cell::unsync::OnceCell;
use serde_json::Value;
use std::sync::Arc;

/// Route name and path values attached to a request after resolution.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub route: Arc<str>,
    pub values: ParamVec,
}

#[derive(Debug, Clone)]
pub enum Request {
    Http(HttpRequest),
    Cli(CliRequest),
}

impl Request {
    #[must_use]
    pub fn surface(&self) -> Surface {
        match self {
            Request::Http(_) => Surface::Http,
            Request::Cli(_) => Surface::Cli,
        }
    }

    /// Normalized path used for route matching.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Request::Http(r) => r.path(),
            Request::Cli(r) => r.path(),
        }
    }

    fn binding_cell(&self) -> &OnceCell<RouteBinding> {
        match self {
            Request::Http(r) => &r.binding,
            Request::Cli(r) => &r.binding,
        }
    }

    #[must_use]
    pub fn binding(&self) -> Option<&RouteBinding> {
        self.binding_cell().get()
    }

    /// Attach the resolved route. Fails if the request was already bound.
    pub fn bind(&self, route: Arc<str>, values: ParamVec) -> Result<(), DispatchError> {
        self.binding_cell()
            .set(RouteBinding { route, values })
            .map_err(|existing| {
                DispatchError::System(anyhow::anyhow!(
                    "request already bound to route '{}'",
                    existing.route
                ))
            })
    }

    #[must_use]
    pub fn route_name(&self) -> Option<&str> {
        self.binding().map(|b| &*b.route)
    }

    /// Values extracted from the path; empty before binding.
    #[must_use]
    pub fn path_values(&self) -> &[(Arc<str>, String)] {
        self.binding().map_or(&[], |b| b.values.as_slice())
    }

    #[must_use]
    pub fn path_value(&self, name: &str) -> Option<&str> {
        self.path_values()
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Lookup across path values, then query/body (HTTP) or flags (CLI).
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.path_value(name) {
            return Some(Value::String(value.to_string()));
        }
        match self {
            Request::Http(r) => r.data(name).cloned(),
            Request::Cli(r) => r.parameter(name).cloned(),
        }
    }

    #[must_use]
    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            Request::Http(r) => Some(r),
            Request::Cli(_) => None,
        }
    }

    #[must_use]
    pub fn as_cli(&self) -> Option<&CliRequest> {
        match self {
            Request::Cli(r) => Some(r),
            Request::Http(_) => None,
        }
    }
}

impl From<HttpRequest> for Request {
    fn from(request: HttpRequest) -> Self {
        Request::Http(request)
    }
}

impl From<CliRequest> for Request {
    fn from(request: CliRequest) -> Self {
        Request::Cli(request)
    }
}
