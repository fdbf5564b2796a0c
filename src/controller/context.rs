use crate::error::{DispatchError, UserError};
use crate::ids::DispatchId;
use crate::pattern::PathValues;
use crate::request::{CliRequest, HttpRequest, Request};
use crate::response::{HtmlResponse, RedirectResponse, Response};
use crate::route::{Route, UrlGenerator};
use crate::runtime_config::AppConfig;
use crate::session::SessionStore;
use serde_json::{Map, Value};
use std::fmt::Write;

/// Everything a controller sees while it runs.
pub struct ControllerContext<'a> {
    request: &'a Request,
    route: &'a Route,
    options: Map<String, Value>,
    output: String,
    urls: UrlGenerator<'a>,
    config: &'a AppConfig,
    session: &'a dyn SessionStore,
    dispatch_id: DispatchId,
}

impl<'a> ControllerContext<'a> {
    pub fn new(
        request: &'a Request,
        route: &'a Route,
        urls: UrlGenerator<'a>,
        config: &'a AppConfig,
        session: &'a dyn SessionStore,
        dispatch_id: DispatchId,
    ) -> Self {
        Self {
            request,
            route,
            options: route.options().clone(),
            output: String::new(),
            urls,
            config,
            session,
            dispatch_id,
        }
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    pub fn route(&self) -> &'a Route {
        self.route
    }

    /// HTTP view of the request.
    ///
    /// # Errors
    ///
    /// A system error when the controller runs on the CLI surface.
    pub fn http(&self) -> Result<&'a HttpRequest, DispatchError> {
        self.request.as_http().ok_or_else(|| {
            DispatchError::System(anyhow::anyhow!(
                "route \"{}\" expects an HTTP request",
                self.route.name()
            ))
        })
    }

    /// CLI view of the request.
    ///
    /// # Errors
    ///
    /// A system error when the controller runs on the HTTP surface.
    pub fn cli(&self) -> Result<&'a CliRequest, DispatchError> {
        self.request.as_cli().ok_or_else(|| {
            DispatchError::System(anyhow::anyhow!(
                "route \"{}\" expects a CLI request",
                self.route.name()
            ))
        })
    }

    /// Options inherited from the route, private to this controller instance.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn path_value(&self, name: &str) -> Option<&'a str> {
        self.request.path_value(name)
    }

    pub fn urls(&self) -> UrlGenerator<'a> {
        self.urls
    }

    pub fn config(&self) -> &'a AppConfig {
        self.config
    }

    pub fn session(&self) -> &'a dyn SessionStore {
        self.session
    }

    pub fn dispatch_id(&self) -> DispatchId {
        self.dispatch_id
    }

    /// Buffer incidental output.
    pub fn print(&mut self, text: impl AsRef<str>) {
        self.output.push_str(text.as_ref());
    }

    pub fn println(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.output, "{}", text.as_ref());
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// HTML response rendered from `layout` when sent.
    pub fn render(&self, layout: impl Into<String>, values: Value) -> Response {
        HtmlResponse::collect_from(layout, values).into()
    }

    /// Temporary redirect to a named HTTP route.
    ///
    /// # Errors
    ///
    /// A system error when the URL cannot be generated.
    pub fn redirect_to<V: PathValues + ?Sized>(
        &self,
        name: &str,
        values: &V,
    ) -> Result<Response, DispatchError> {
        Ok(RedirectResponse::to_route(&self.urls, name, values)?.into())
    }

    /// URL of the current route with some path values replaced.
    ///
    /// # Errors
    ///
    /// A system error when the URL cannot be generated.
    pub fn format_url(&self, overrides: &[(&str, &str)]) -> Result<String, DispatchError> {
        let mut values: Vec<(String, String)> = self
            .request
            .path_values()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        for (key, value) in overrides {
            match values.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = (*value).to_string(),
                None => values.push(((*key).to_string(), (*value).to_string())),
            }
        }
        Ok(self.urls.url(self.route.name(), &values)?)
    }

    /// Validate the route's declared CLI parameters and return their parsed values.
    ///
    /// # Errors
    ///
    /// A user error naming the first missing or invalid parameter.
    pub fn verify_arguments(&self) -> Result<Map<String, Value>, DispatchError> {
        let cli = self.cli()?;
        let types = self.urls.registry().data_types();
        let mut verified = Map::new();
        for argument in self.route.arguments() {
            if let Some(value) = argument.verify(cli.parameters(), types)? {
                verified.insert(argument.long.clone(), value);
            }
        }
        Ok(verified)
    }

    /// Usage lines of the declared CLI parameters.
    pub fn usage(&self) -> String {
        let types = self.urls.registry().data_types();
        let flags: Vec<String> = self
            .route
            .arguments()
            .iter()
            .map(|a| a.usage(types))
            .collect();
        format!("{} {}", self.route.template(), flags.join(" "))
            .trim_end()
            .to_string()
    }

    /// Shorthand for an expected failure.
    pub fn user_error(&self, message: impl Into<String>) -> DispatchError {
        DispatchError::User(UserError::new(message))
    }
}
