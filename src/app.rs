//! Application wiring: configuration, a lazily built route registry and the collaborators
//! each dispatch needs.
//!
//! The registry is built on first use and never again. Controllers, restrictions and data
//! types are registered on the blueprint [`RegistryBuilder`] before that point; route
//! definitions come from the blueprint itself plus, unless disabled, the YAML files under
//! [`AppConfig::routes_dir`].

use crate::dispatcher::{Dispatcher, ErrorReporter, Outcome, TracingReporter};
use crate::error::ConfigError;
use crate::request::{CliRequest, HttpRequest, Request};
use crate::response::{LayoutRenderer, TemplateRenderer, Transport};
use crate::route::{DirectoryConfigSource, RegistryBuilder, RouteProvider, RouteRegistry, UrlGenerator};
use crate::runtime_config::AppConfig;
use crate::session::{NullSession, SessionStore};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

pub struct Application {
    config: AppConfig,
    blueprint: RegistryBuilder,
    providers: Vec<(String, Arc<dyn RouteProvider>)>,
    load_routes: bool,
    registry: OnceCell<RouteRegistry>,
    renderer: Box<dyn LayoutRenderer>,
    session: Box<dyn SessionStore>,
    reporter: Box<dyn ErrorReporter + Send + Sync>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("blueprint", &self.blueprint)
            .field("providers", &self.providers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("load_routes", &self.load_routes)
            .field("built", &self.registry.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Application reading route files from `config.routes_dir` and layouts from
    /// `config.layouts_dir`.
    pub fn new(config: AppConfig) -> Self {
        let renderer = TemplateRenderer::new(config.layouts_dir.clone());
        Self {
            config,
            blueprint: RegistryBuilder::new(),
            providers: Vec::new(),
            load_routes: true,
            registry: OnceCell::new(),
            renderer: Box::new(renderer),
            session: Box::new(NullSession),
            reporter: Box::new(TracingReporter),
        }
    }

    /// Use only the routes registered on [`Application::builder_mut`].
    #[must_use]
    pub fn without_route_files(mut self) -> Self {
        self.load_routes = false;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, key: impl Into<String>, provider: Arc<dyn RouteProvider>) -> Self {
        self.providers.push((key.into(), provider));
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl LayoutRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: impl SessionStore + 'static) -> Self {
        self.session = Box::new(session);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + Send + Sync + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Registration surface for controllers, restrictions, data types and programmatic routes.
    ///
    /// Changes made after the registry was built have no effect.
    pub fn builder_mut(&mut self) -> &mut RegistryBuilder {
        &mut self.blueprint
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The registry, built on the first call.
    ///
    /// # Errors
    ///
    /// Any error raised while loading route files or validating registrations. A failed build
    /// is retried on the next call.
    pub fn registry(&self) -> Result<&RouteRegistry, ConfigError> {
        self.registry.get_or_try_init(|| {
            let mut builder = self.blueprint.clone();
            if self.load_routes {
                let source = self.providers.iter().fold(
                    DirectoryConfigSource::new(&self.config.routes_dir, &self.config.packages_dir)
                        .with_dev(self.config.dev),
                    |source, (key, provider)| source.with_provider(key.clone(), Arc::clone(provider)),
                );
                builder.load(&source)?;
            }
            let registry = builder.build()?;
            info!(
                routes = registry.len(),
                dev = self.config.dev,
                debug = self.config.debug,
                "Application ready"
            );
            Ok(registry)
        })
    }

    /// Dispatcher over the built registry.
    ///
    /// # Errors
    ///
    /// See [`Application::registry`].
    pub fn dispatcher(&self) -> Result<Dispatcher<'_>, ConfigError> {
        let registry = self.registry()?;
        Ok(Dispatcher::new(registry, &self.config)
            .with_renderer(self.renderer.as_ref())
            .with_session(self.session.as_ref())
            .with_reporter(self.reporter.as_ref()))
    }

    /// # Errors
    ///
    /// See [`Application::registry`].
    pub fn urls(&self) -> Result<UrlGenerator<'_>, ConfigError> {
        let registry = self.registry()?;
        Ok(UrlGenerator::new(
            registry,
            &self.config.web_root,
            &self.config.cli_root_command,
        ))
    }

    /// Dispatch one request and send its response.
    ///
    /// # Errors
    ///
    /// Only registry construction fails; dispatch errors become responses.
    pub fn handle(&self, request: &Request, transport: &mut dyn Transport) -> Result<Outcome, ConfigError> {
        let dispatcher = self.dispatcher().map_err(|e| {
            error!(error = %e, "Route registry unavailable");
            e
        })?;
        Ok(dispatcher.handle(request, transport))
    }

    /// # Errors
    ///
    /// See [`Application::handle`].
    pub fn handle_http(&self, request: HttpRequest, transport: &mut dyn Transport) -> Result<Outcome, ConfigError> {
        self.handle(&Request::from(request), transport)
    }

    /// # Errors
    ///
    /// See [`Application::handle`].
    pub fn handle_cli(&self, request: CliRequest, transport: &mut dyn Transport) -> Result<Outcome, ConfigError> {
        self.handle(&Request::from(request), transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::BufferedTransport;
    use crate::route::HttpRouteConfig;
    use http::Method;

    #[test]
    fn test_registry_built_once_from_blueprint() {
        let mut app = Application::new(AppConfig::default()).without_route_files();
        app.builder_mut()
            .register_http(
                "old",
                HttpRouteConfig::redirect("/old", "/new").with_method("GET"),
            )
            .unwrap();

        let first = app.registry().unwrap() as *const RouteRegistry;
        let second = app.registry().unwrap() as *const RouteRegistry;
        assert_eq!(first, second);

        let mut transport = BufferedTransport::new();
        let outcome = app
            .handle_http(HttpRequest::new(Method::GET, "/old"), &mut transport)
            .unwrap();
        assert_eq!(outcome.code, 302);
        assert_eq!(transport.header("location"), Some("/new"));
    }

    #[test]
    fn test_missing_route_files_fail_registry() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            routes_dir: dir.path().join("missing"),
            ..AppConfig::default()
        };
        let app = Application::new(config);
        assert!(matches!(app.registry(), Err(ConfigError::Io { .. })));
    }
}
