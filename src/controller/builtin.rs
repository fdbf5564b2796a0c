//! Controllers shipped with the registry.
//!
//! | Key | Controller | Options |
//! |---|---|---|
//! | `redirect` | [`RedirectController`] | `redirect` (route name or URL), `permanent` |
//! | `static_page` | [`StaticPageController`] | `render` (layout) |
//! | `resource` | [`ResourceController`] | `resources_dir`, `package`, `max_age` |
//! | `routes` | [`RouteListController`] | |
//!
//! [`DefaultHttpController`] and [`DefaultCliController`] are the fallbacks used when no
//! route matches or when sending a response fails.

use super::{Controller, ControllerContext};
use crate::error::DispatchError;
use crate::response::{
    CliResponse, ErrorContext, FileResponse, JsonResponse, RedirectResponse, Response,
    DEFAULT_MAX_AGE,
};
use crate::route::{OutputFormat, RouteKind, Surface};
use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};

pub const REDIRECT_CONTROLLER: &str = "redirect";
pub const STATIC_PAGE_CONTROLLER: &str = "static_page";
pub const RESOURCE_CONTROLLER: &str = "resource";
pub const ROUTE_LIST_CONTROLLER: &str = "routes";

/// Redirects to the route or URL named by the `redirect` option.
///
/// A route name receives the current path values, so `/old/{id}` can forward to
/// `/new/{id}`.
#[derive(Debug, Default)]
pub struct RedirectController;

impl Controller for RedirectController {
    fn uses_session(&self) -> bool {
        false
    }

    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let target = ctx.option_str("redirect").ok_or_else(|| {
            DispatchError::System(anyhow::anyhow!(
                "route \"{}\" has no \"redirect\" option",
                ctx.route().name()
            ))
        })?;
        let permanent = ctx
            .option("permanent")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let location = if target.contains("://") || target.starts_with('/') {
            target.to_string()
        } else {
            ctx.urls().url(target, ctx.request().path_values())?
        };
        Ok(RedirectResponse::new(location, permanent).into())
    }
}

/// Renders the layout named by the `render` option.
#[derive(Debug, Default)]
pub struct StaticPageController;

impl Controller for StaticPageController {
    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let layout = ctx.option_str("render").ok_or_else(|| {
            DispatchError::System(anyhow::anyhow!(
                "route \"{}\" has no \"render\" option",
                ctx.route().name()
            ))
        })?;
        let values: Map<String, Value> = ctx
            .request()
            .path_values()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        Ok(ctx.render(
            layout,
            json!({
                "route": ctx.route().name(),
                "values": values,
                "options": ctx.options(),
            }),
        ))
    }
}

/// Serves a local file named by the `resource` path value.
#[derive(Debug, Default)]
pub struct ResourceController;

impl ResourceController {
    /// Join `relative` under `base`, rejecting anything that escapes it.
    fn resolve(base: &Path, relative: &str) -> Option<PathBuf> {
        let mut path = base.to_path_buf();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }
}

impl Controller for ResourceController {
    fn uses_session(&self) -> bool {
        false
    }

    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let resource = ctx
            .path_value("resource")
            .ok_or_else(|| DispatchError::not_found("resource"))?;
        let mut base = PathBuf::from(ctx.option_str("resources_dir").unwrap_or("resources"));
        if let Some(package) = ctx.option_str("package") {
            base = ctx.config().packages_dir.join(package).join(base);
        }
        let path = Self::resolve(&base, resource)
            .ok_or_else(|| DispatchError::not_found(format!("resource {resource}")))?;
        let max_age = ctx
            .option("max_age")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_MAX_AGE);
        Ok(FileResponse::local(path)?
            .inline()
            .with_max_age(max_age)
            .into())
    }
}

/// Lists registered routes: text on the CLI, JSON over HTTP.
#[derive(Debug, Default)]
pub struct RouteListController;

impl Controller for RouteListController {
    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let registry = ctx.urls().registry();
        match ctx.request().surface() {
            Surface::Cli => {
                let lines: Vec<String> = registry.routes().iter().map(|r| r.to_string()).collect();
                Ok(CliResponse::ok(lines.join("\n")).into())
            }
            Surface::Http => {
                let routes: Vec<Value> = registry
                    .routes()
                    .iter()
                    .map(|route| {
                        let methods: Vec<&str> = match route.kind() {
                            RouteKind::Http { methods } => {
                                methods.iter().map(http::Method::as_str).collect()
                            }
                            RouteKind::Cli { .. } => Vec::new(),
                        };
                        json!({
                            "name": route.name(),
                            "surface": route.surface(),
                            "path": route.template(),
                            "methods": methods,
                            "controller": route.controller(),
                        })
                    })
                    .collect();
                Ok(JsonResponse::new(Value::Array(routes)).into())
            }
        }
    }
}

/// HTTP fallback: answers unmatched requests with 404 and renders HTML error pages.
#[derive(Debug, Default)]
pub struct DefaultHttpController;

impl Controller for DefaultHttpController {
    fn uses_session(&self) -> bool {
        false
    }

    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        Err(DispatchError::not_found(ctx.request().path().to_string()))
    }

    fn handle_user_error(&self, err: &DispatchError, ctx: &ErrorContext) -> Option<Response> {
        Some(Response::from_error(OutputFormat::Html, err, ctx))
    }

    fn handle_system_error(&self, err: &DispatchError, ctx: &ErrorContext) -> Option<Response> {
        Some(Response::from_error(OutputFormat::Html, err, ctx))
    }
}

/// CLI fallback: unknown commands exit with 1 and a hint.
#[derive(Debug, Default)]
pub struct DefaultCliController;

impl Controller for DefaultCliController {
    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        Err(DispatchError::not_found(format!(
            "command \"{}\"",
            ctx.request().path()
        )))
    }

    fn handle_user_error(&self, err: &DispatchError, ctx: &ErrorContext) -> Option<Response> {
        Some(Response::from_error(OutputFormat::Cli, err, ctx))
    }

    fn handle_system_error(&self, err: &DispatchError, ctx: &ErrorContext) -> Option<Response> {
        Some(Response::from_error(OutputFormat::Cli, err, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_resolution_rejects_traversal() {
        let base = Path::new("resources");
        assert_eq!(
            ResourceController::resolve(base, "css/site.css"),
            Some(PathBuf::from("resources/css/site.css"))
        );
        assert!(ResourceController::resolve(base, "../secrets.txt").is_none());
    }
}
