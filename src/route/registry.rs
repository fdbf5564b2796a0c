use super::config::{CliRouteConfig, HttpRouteConfig, RouteConfigSource, RouteTable};
use super::core::{Matchable, OutputFormat, Route, RouteKind, Surface, KNOWN_METHODS};
use crate::controller::builtin::{
    DefaultCliController, DefaultHttpController, RedirectController, ResourceController,
    RouteListController, StaticPageController, REDIRECT_CONTROLLER, RESOURCE_CONTROLLER,
    ROUTE_LIST_CONTROLLER, STATIC_PAGE_CONTROLLER,
};
use crate::controller::Controller;
use crate::datatype::{CliArgument, DataType, DataTypeRegistry};
use crate::error::{ConfigError, DispatchError};
use crate::pattern::{ParamVec, PathPattern, TypeAliases};
use crate::request::Request;
use http::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Access checker: `(route, restriction options, request) -> allowed`.
pub type RestrictionChecker = Arc<dyn Fn(&Route, &Value, &Request) -> bool + Send + Sync>;

/// Builds the controller bound to a route.
pub type ControllerFactory = Arc<dyn Fn(&Route) -> Box<dyn Controller> + Send + Sync>;

/// Builds the global fallback controller of a surface.
pub type DefaultControllerFactory = Arc<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

type RouteKey = (Surface, String);

/// Mutable stage of the registry.
///
/// Controllers and access restrictions are referenced by symbolic key; every key a route
/// uses is checked in [`RegistryBuilder::build`], so a typo fails at startup rather than on
/// the first matching request.
#[derive(Clone)]
pub struct RegistryBuilder {
    aliases: TypeAliases,
    types: DataTypeRegistry,
    controllers: HashMap<String, ControllerFactory>,
    restrictions: HashMap<String, RestrictionChecker>,
    default_http: DefaultControllerFactory,
    default_cli: DefaultControllerFactory,
    routes: Vec<Route>,
    index: HashMap<RouteKey, usize>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("routes", &self.routes.len())
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("restrictions", &self.restrictions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Builder with the default type aliases, data types and built-in controllers.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            aliases: TypeAliases::default(),
            types: DataTypeRegistry::default(),
            controllers: HashMap::new(),
            restrictions: HashMap::new(),
            default_http: Arc::new(|| Box::new(DefaultHttpController) as Box<dyn Controller>),
            default_cli: Arc::new(|| Box::new(DefaultCliController) as Box<dyn Controller>),
            routes: Vec::new(),
            index: HashMap::new(),
        };
        builder
            .register_controller(REDIRECT_CONTROLLER, |_| Box::new(RedirectController))
            .register_controller(STATIC_PAGE_CONTROLLER, |_| Box::new(StaticPageController))
            .register_controller(RESOURCE_CONTROLLER, |_| Box::new(ResourceController))
            .register_controller(ROUTE_LIST_CONTROLLER, |_| Box::new(RouteListController));
        builder
    }

    /// Register a `{alias:name}` type alias. Affects routes registered afterwards.
    pub fn register_type_alias(
        &mut self,
        alias: impl Into<String>,
        pattern: impl Into<String>,
    ) -> &mut Self {
        self.aliases.register(alias, pattern);
        self
    }

    pub fn register_data_type(&mut self, data_type: Arc<dyn DataType>) -> &mut Self {
        self.types.register(data_type);
        self
    }

    pub fn register_controller<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Route) -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.controllers.insert(key.into(), Arc::new(factory));
        self
    }

    /// Register the checker for restriction type `kind`.
    pub fn register_restriction<F>(&mut self, kind: impl Into<String>, checker: F) -> &mut Self
    where
        F: Fn(&Route, &Value, &Request) -> bool + Send + Sync + 'static,
    {
        self.restrictions.insert(kind.into(), Arc::new(checker));
        self
    }

    pub fn default_http_controller<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.default_http = Arc::new(factory);
        self
    }

    pub fn default_cli_controller<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.default_cli = Arc::new(factory);
        self
    }

    /// Register an HTTP route from its parts.
    ///
    /// An empty `methods` slice accepts every known method.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::register_http`].
    pub fn register(
        &mut self,
        name: &str,
        template: &str,
        controller: &str,
        methods: &[Method],
        restrictions: Vec<(String, Value)>,
        options: Map<String, Value>,
    ) -> Result<&mut Self, ConfigError> {
        let mut config = HttpRouteConfig::new(template, controller);
        config.method = methods.iter().map(|m| m.as_str().to_string()).collect();
        config.restrict_to = restrictions.into_iter().collect();
        config.options = options;
        self.register_http(name, config)
    }

    /// Register an HTTP route.
    ///
    /// Registering an existing name with the same path and controller adds the new methods
    /// to the existing route; option `replace: true` replaces it instead.
    ///
    /// # Errors
    ///
    /// Missing `path`/`controller`, unknown methods or output, an invalid path template, or a
    /// conflicting re-registration.
    pub fn register_http(
        &mut self,
        name: &str,
        config: HttpRouteConfig,
    ) -> Result<&mut Self, ConfigError> {
        let path = config.path.ok_or_else(|| ConfigError::MissingField {
            route: name.to_string(),
            field: "path",
        })?;
        let options = config.options;
        let controller = match config.controller {
            Some(controller) => controller,
            None if options.contains_key("redirect") => REDIRECT_CONTROLLER.to_string(),
            None if options.contains_key("render") => STATIC_PAGE_CONTROLLER.to_string(),
            None => {
                return Err(ConfigError::MissingField {
                    route: name.to_string(),
                    field: "controller",
                })
            }
        };
        let methods = parse_methods(name, &config.method)?;
        let output = match config.output.or(config.response) {
            Some(output) => OutputFormat::parse(&output)
                .filter(|f| *f != OutputFormat::Cli)
                .ok_or(ConfigError::UnknownOutput {
                    route: name.to_string(),
                    output,
                })?,
            None => OutputFormat::Html,
        };
        let replace = options
            .get("replace")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let pattern = PathPattern::compile(&path, &self.aliases)
            .map_err(|e| ConfigError::pattern(name, e))?;

        let route = Route::new(
            name,
            pattern,
            RouteKind::Http { methods },
            controller,
            config.restrict_to.into_iter().collect(),
            output,
            options,
        );
        self.insert(route, replace)?;
        Ok(self)
    }

    /// Register a CLI route; an existing route of the same name is replaced.
    ///
    /// # Errors
    ///
    /// Missing `path`/`controller`, an invalid path, or a malformed parameter declaration.
    pub fn register_cli(
        &mut self,
        name: &str,
        config: CliRouteConfig,
    ) -> Result<&mut Self, ConfigError> {
        let path = config.path.ok_or_else(|| ConfigError::MissingField {
            route: name.to_string(),
            field: "path",
        })?;
        let controller = config.controller.ok_or_else(|| ConfigError::MissingField {
            route: name.to_string(),
            field: "controller",
        })?;
        let mut arguments = Vec::with_capacity(config.parameters.len());
        for (long, declaration) in &config.parameters {
            let declaration = match declaration {
                Value::String(s) => s.as_str(),
                Value::Null => "",
                _ => {
                    return Err(ConfigError::InvalidParameter {
                        route: name.to_string(),
                        parameter: long.clone(),
                        reason: "declaration must be a string".to_string(),
                    })
                }
            };
            arguments.push(CliArgument::parse(name, long, declaration)?);
        }
        let pattern = PathPattern::compile(&path, &self.aliases)
            .map_err(|e| ConfigError::pattern(name, e))?;

        let route = Route::new(
            name,
            pattern,
            RouteKind::Cli { arguments },
            controller,
            config.restrict_to.into_iter().collect(),
            OutputFormat::Cli,
            config.options,
        );
        self.insert(route, true)?;
        Ok(self)
    }

    /// Register every definition of a merged table, in order.
    ///
    /// # Errors
    ///
    /// The first registration error.
    pub fn register_table(&mut self, table: RouteTable) -> Result<&mut Self, ConfigError> {
        for (name, config) in table.http {
            self.register_http(&name, config)?;
        }
        for (name, config) in table.cli {
            self.register_cli(&name, config)?;
        }
        Ok(self)
    }

    /// Load and register every definition from `source`.
    ///
    /// # Errors
    ///
    /// Source or registration errors.
    pub fn load(&mut self, source: &dyn RouteConfigSource) -> Result<&mut Self, ConfigError> {
        let table = source.load()?;
        self.register_table(table)
    }

    fn insert(&mut self, route: Route, replace: bool) -> Result<(), ConfigError> {
        let key = (route.surface(), route.name().to_string());
        let Some(&position) = self.index.get(&key) else {
            self.index.insert(key, self.routes.len());
            self.routes.push(route);
            return Ok(());
        };

        let existing = &mut self.routes[position];
        if replace {
            debug!(route = %route.name(), surface = %route.surface(), "Route replaced");
            *existing = route;
        } else if existing.template() == route.template()
            && existing.controller() == route.controller()
        {
            debug!(
                route = %route.name(),
                methods = ?route.methods(),
                "Route methods added to existing registration"
            );
            existing.add_methods(route.methods());
        } else {
            return Err(ConfigError::Conflict {
                route: route.name().to_string(),
                reason: format!(
                    "already registered as {} -> {}",
                    existing.template(),
                    existing.controller()
                ),
            });
        }
        Ok(())
    }

    /// Validate every symbolic reference and freeze the registry.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownController`], [`ConfigError::UnknownRestriction`] or
    /// [`ConfigError::InvalidParameter`] for an unknown parameter type.
    pub fn build(self) -> Result<RouteRegistry, ConfigError> {
        for route in &self.routes {
            if !self.controllers.contains_key(route.controller()) {
                return Err(ConfigError::UnknownController {
                    route: route.name().to_string(),
                    controller: route.controller().to_string(),
                });
            }
            for (restriction, _) in route.restrictions() {
                if !self.restrictions.contains_key(restriction) {
                    return Err(ConfigError::UnknownRestriction {
                        route: route.name().to_string(),
                        restriction: restriction.clone(),
                    });
                }
            }
            for argument in route.arguments() {
                if !self.types.contains(&argument.type_name) {
                    return Err(ConfigError::InvalidParameter {
                        route: route.name().to_string(),
                        parameter: argument.long.clone(),
                        reason: format!("unknown type \"{}\"", argument.type_name),
                    });
                }
            }
        }

        let routes: Vec<Arc<Route>> = self.routes.into_iter().map(Arc::new).collect();
        let http_count = routes.iter().filter(|r| r.surface() == Surface::Http).count();
        let summary: Vec<String> = routes.iter().take(10).map(ToString::to_string).collect();
        info!(
            routes_count = routes.len(),
            http_routes = http_count,
            cli_routes = routes.len() - http_count,
            routes_summary = ?summary,
            "Route registry built"
        );

        Ok(RouteRegistry {
            routes,
            index: self.index,
            controllers: self.controllers,
            restrictions: self.restrictions,
            default_http: self.default_http,
            default_cli: self.default_cli,
            types: self.types,
            aliases: self.aliases,
        })
    }
}

fn parse_methods(route: &str, declared: &[String]) -> Result<Vec<Method>, ConfigError> {
    let mut methods = Vec::new();
    let mut unknown = Vec::new();
    let names = declared
        .iter()
        .flat_map(|d| d.split(|c: char| c == '|' || c == ',' || c.is_whitespace()))
        .filter(|s| !s.is_empty());
    for name in names {
        let upper = name.to_ascii_uppercase();
        match KNOWN_METHODS.iter().find(|m| m.as_str() == upper) {
            Some(method) if !methods.contains(method) => methods.push(method.clone()),
            Some(_) => {}
            None => unknown.push(name.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownMethod {
            route: route.to_string(),
            methods: unknown,
        });
    }
    if methods.is_empty() {
        methods.extend(KNOWN_METHODS.iter().cloned());
    }
    Ok(methods)
}

/// Frozen collection of routes, built once at startup and read-only afterwards.
pub struct RouteRegistry {
    routes: Vec<Arc<Route>>,
    index: HashMap<RouteKey, usize>,
    controllers: HashMap<String, ControllerFactory>,
    restrictions: HashMap<String, RestrictionChecker>,
    default_http: DefaultControllerFactory,
    default_cli: DefaultControllerFactory,
    types: DataTypeRegistry,
    aliases: TypeAliases,
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl RouteRegistry {
    /// Every route, in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn routes_for(&self, surface: Surface) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter().filter(move |r| r.surface() == surface)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    #[must_use]
    pub fn get(&self, surface: Surface, name: &str) -> Option<&Arc<Route>> {
        self.index
            .get(&(surface, name.to_string()))
            .and_then(|&i| self.routes.get(i))
    }

    /// Route by name, HTTP routes first.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownRoute`].
    pub fn get_by_name(&self, name: &str) -> Result<&Arc<Route>, ConfigError> {
        self.get(Surface::Http, name)
            .or_else(|| self.get(Surface::Cli, name))
            .ok_or_else(|| ConfigError::UnknownRoute(name.to_string()))
    }

    /// First route, in registration order, accepting `request`.
    #[must_use]
    pub fn find_first_matching(&self, request: &Request) -> Option<(Arc<Route>, ParamVec)> {
        let surface = request.surface();
        debug!(surface = %surface, path = %request.path(), "Route match attempt");

        for route in self.routes_for(surface) {
            if let Some(values) = route.matches(request) {
                info!(
                    surface = %surface,
                    path = %request.path(),
                    route = %route.name(),
                    route_pattern = %route.template(),
                    path_values = ?values,
                    "Route matched"
                );
                return Some((Arc::clone(route), values));
            }
        }

        warn!(surface = %surface, path = %request.path(), "No route matched");
        None
    }

    /// Run the route's access restrictions in declaration order.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownRestriction`] for a restriction type with no checker.
    pub fn is_accessible(&self, route: &Route, request: &Request) -> Result<bool, ConfigError> {
        for (restriction, options) in route.restrictions() {
            let checker =
                self.restrictions
                    .get(restriction)
                    .ok_or_else(|| ConfigError::UnknownRestriction {
                        route: route.name().to_string(),
                        restriction: restriction.clone(),
                    })?;
            if !checker(route, options, request) {
                debug!(route = %route.name(), restriction = %restriction, "Access denied");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Instantiate the controller bound to `route`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] when the controller key is unknown.
    pub fn instantiate(&self, route: &Route) -> Result<Box<dyn Controller>, DispatchError> {
        let factory = self.controllers.get(route.controller()).ok_or_else(|| {
            DispatchError::not_found(format!("controller \"{}\"", route.controller()))
        })?;
        Ok(factory(route))
    }

    /// Fresh instance of the surface's fallback controller.
    #[must_use]
    pub fn default_controller(&self, surface: Surface) -> Box<dyn Controller> {
        match surface {
            Surface::Http => (self.default_http)(),
            Surface::Cli => (self.default_cli)(),
        }
    }

    #[must_use]
    pub fn data_types(&self) -> &DataTypeRegistry {
        &self.types
    }

    #[must_use]
    pub fn type_aliases(&self) -> &TypeAliases {
        &self.aliases
    }
}
