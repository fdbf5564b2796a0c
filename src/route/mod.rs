//! # Route Module
//!
//! Routes, their registry, configuration sources and reverse routing.
//!
//! ## Lifecycle
//!
//! 1. Definitions are merged from a [`RouteConfigSource`] (YAML files, package requirements,
//!    programmatic [`RouteProvider`]s) into a [`RouteTable`]
//! 2. A [`RegistryBuilder`] compiles every path template and records the controller and
//!    restriction keys each route refers to
//! 3. [`RegistryBuilder::build`] validates those keys and freezes a [`RouteRegistry`]
//! 4. Each request is resolved with [`RouteRegistry::find_first_matching`]: a linear scan in
//!    registration order, where the HTTP method filter runs before the path regex
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register_controller("user_show", |_| Box::new(UserShow))
//!     .register_http("user_show", HttpRouteConfig::new("/users/{int:id}", "user_show").with_method("GET"))?;
//! let registry = builder.build()?;
//! let urls = UrlGenerator::new(&registry, "https://example.com", "");
//! assert_eq!(urls.url("user_show", &[("id", "42")])?, "https://example.com/users/42");
//! ```

pub mod config;
mod core;
mod registry;
mod urls;

pub use self::core::{Matchable, OutputFormat, Route, RouteKind, Surface, KNOWN_METHODS};
pub use config::{
    CliRouteConfig, DirectoryConfigSource, HttpRouteConfig, RouteConfigSource, RouteFileExtras,
    RouteProvider, RouteTable,
};
pub use registry::{
    ControllerFactory, DefaultControllerFactory, RegistryBuilder, RestrictionChecker,
    RouteRegistry,
};
pub use urls::UrlGenerator;
