//! # brrtdispatch
//!
//! **brrtdispatch** is a declarative route registry and request dispatcher for applications
//! that answer both HTTP requests and command-line invocations through the same controllers.
//!
//! ## Overview
//!
//! Routes are declared in YAML (or registered programmatically) with typed path templates
//! such as `/users/{int:id}/posts/{slug}`. The registry compiles every template once at
//! startup, resolves each request with a first-match-wins scan, and generates URLs and CLI
//! commands back from route names. The dispatcher then drives the matched controller
//! through a phased lifecycle and guarantees that every request ends with a sent response.
//!
//! ## Architecture
//!
//! - **[`pattern`]** - Path templates: compilation to anchored regexes, extraction, reverse
//!   formatting
//! - **[`route`]** - Routes, the [`RouteRegistry`](route::RouteRegistry), YAML configuration
//!   sources and the [`UrlGenerator`](route::UrlGenerator)
//! - **[`datatype`]** - Typed CLI parameter declarations and their validation
//! - **[`request`]** - HTTP and CLI request models, including the CLI flag parser
//! - **[`controller`]** - The [`Controller`](controller::Controller) lifecycle trait and the
//!   built-in controllers
//! - **[`dispatcher`]** - Lifecycle driver with error classification and diversion
//! - **[`response`]** - HTML, JSON, redirect, file and CLI responses and their transports
//! - **[`app`]** - [`Application`](app::Application): configuration plus a load-once registry
//! - **[`server`]** - Single-threaded HTTP host on `tiny_http`
//! - **[`cli`]** - The `brrtdispatch` binary's commands
//! - **[`runtime_config`]**, **[`logging`]**, **[`error`]**, **[`ids`]**, **[`session`]** -
//!   Ambient support
//!
//! ## Request Lifecycle
//!
//! ```text
//! request ─▶ registry.find_first_matching ─▶ bind(route, values)
//!         ─▶ controller.prepare ─▶ access check ─▶ pre_run ─┬─▶ run ─▶ post_run ─┐
//!                                                          └── short-circuit ───┤
//!                                                                               ▼
//!                                                                         response.send
//! ```
//!
//! Errors raised anywhere in that chain are classified as user-facing (not found,
//! forbidden, user errors) or system errors, converted into a response in the route's
//! output format, and sent in place of the regular response.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brrtdispatch::app::Application;
//! use brrtdispatch::request::HttpRequest;
//! use brrtdispatch::response::BufferedTransport;
//! use brrtdispatch::route::HttpRouteConfig;
//! use brrtdispatch::runtime_config::AppConfig;
//!
//! let mut app = Application::new(AppConfig::default()).without_route_files();
//! app.builder_mut()
//!     .register_controller("user_show", |_| Box::new(UserShow))
//!     .register_http("user_show", HttpRouteConfig::new("/users/{int:id}", "user_show"))?;
//!
//! let mut transport = BufferedTransport::new();
//! let outcome = app.handle_http(HttpRequest::new(http::Method::GET, "/users/42"), &mut transport)?;
//! assert_eq!(outcome.code, 200);
//! ```
//!
//! ## Route Files
//!
//! ```yaml
//! require-packages:
//!   - blog
//! http:
//!   user_show:
//!     path: /users/{int:id}
//!     method: GET
//!     controller: user_show
//!     restrictTo:
//!       role: admin
//!   legacy_profile:
//!     path: /profile/{int:id}
//!     redirect: user_show
//! cli:
//!   cache_clear:
//!     path: cache/clear
//!     controller: cache_clear
//!     parameters:
//!       all: "a:bool"
//! ```

pub mod app;
pub mod cli;
pub mod controller;
pub mod datatype;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod runtime_config;
pub mod server;
pub mod session;

pub use app::Application;
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{ConfigError, DispatchError, UserError};
pub use request::Request;
pub use response::Response;
pub use route::{RouteRegistry, UrlGenerator};
