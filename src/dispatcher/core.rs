use crate::controller::{Controller, ControllerContext};
use crate::error::DispatchError;
use crate::ids::DispatchId;
use crate::request::Request;
use crate::response::{
    ErrorContext, LayoutRenderer, NullRenderer, Response, SendContext, Transport, CLI_ERROR_CODE,
};
use crate::route::{OutputFormat, Route, RouteRegistry, Surface, UrlGenerator};
use crate::runtime_config::AppConfig;
use crate::session::{NullSession, SessionStore};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Text emitted when neither the response nor the default controller's error response could
/// be sent.
pub const FALLBACK_MESSAGE: &str = "A fatal error occurred and no response could be sent.";

/// Header carrying an inbound correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Step of the dispatch lifecycle an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Instantiate,
    Prepare,
    Access,
    PreRun,
    Run,
    PostRun,
    Send,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Resolve => "resolve",
            Phase::Instantiate => "instantiate",
            Phase::Prepare => "prepare",
            Phase::Access => "access",
            Phase::PreRun => "pre_run",
            Phase::Run => "run",
            Phase::PostRun => "post_run",
            Phase::Send => "send",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for system errors. Called exactly once per system error, never for user errors.
pub trait ErrorReporter {
    fn report(&self, err: &DispatchError, phase: Phase, dispatch_id: DispatchId, route: Option<&str>);
}

/// Reports system errors as `error!` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &DispatchError, phase: Phase, dispatch_id: DispatchId, route: Option<&str>) {
        error!(
            dispatch_id = %dispatch_id,
            phase = %phase,
            route = route.unwrap_or("-"),
            error = %err,
            details = ?err,
            "System error"
        );
    }
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    /// Output printed by a controller that does not capture it; written before the head
    pub stray_output: Option<String>,
    pub dispatch_id: DispatchId,
}

/// Result of [`Dispatcher::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Status or exit code actually sent
    pub code: u16,
    /// True when only the last-resort message could be emitted
    pub fatal: bool,
    pub dispatch_id: DispatchId,
}

/// Runs one request at a time through route resolution, the controller lifecycle and error
/// diversion.
pub struct Dispatcher<'a> {
    registry: &'a RouteRegistry,
    config: &'a AppConfig,
    renderer: &'a dyn LayoutRenderer,
    session: &'a dyn SessionStore,
    reporter: &'a dyn ErrorReporter,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher with no layouts, no session store and tracing-based error reporting.
    pub fn new(registry: &'a RouteRegistry, config: &'a AppConfig) -> Self {
        Self {
            registry,
            config,
            renderer: &NullRenderer,
            session: &NullSession,
            reporter: &TracingReporter,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: &'a dyn LayoutRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: &'a dyn SessionStore) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &'a RouteRegistry {
        self.registry
    }

    pub fn urls(&self) -> UrlGenerator<'a> {
        UrlGenerator::new(
            self.registry,
            &self.config.web_root,
            &self.config.cli_root_command,
        )
    }

    fn error_context(&self) -> ErrorContext {
        let home_url = if self.config.forbidden_to_home {
            self.urls()
                .url(&self.config.default_route, &[] as &[(&str, &str)])
                .map_err(|e| warn!(route = %self.config.default_route, error = %e, "Home URL unavailable"))
                .ok()
        } else {
            None
        };
        ErrorContext {
            debug: self.config.debug,
            forbidden_to_home: self.config.forbidden_to_home,
            home_url,
        }
    }

    /// Resolve and run `request`, turning every error into a response.
    pub fn dispatch(&self, request: &Request) -> Dispatched {
        let dispatch_id = DispatchId::from_header_or_new(
            request.as_http().and_then(|r| r.header(REQUEST_ID_HEADER)),
        );
        let start = Instant::now();
        let surface = request.surface();

        let Some((route, values)) = self.registry.find_first_matching(request) else {
            let err = match surface {
                Surface::Http => DispatchError::not_found(request.path().to_string()),
                Surface::Cli => DispatchError::not_found(format!("command \"{}\"", request.path())),
            };
            let response = self.divert(None, None, surface, err, Phase::Resolve, dispatch_id);
            return self.complete(response, None, dispatch_id, None, start);
        };

        if let Err(err) = request.bind(route.name_arc(), values) {
            let response =
                self.divert(None, Some(&*route), surface, err, Phase::Resolve, dispatch_id);
            return self.complete(response, None, dispatch_id, Some(&*route), start);
        }

        let mut controller = match self.registry.instantiate(&route) {
            Ok(controller) => controller,
            Err(err) => {
                let response =
                    self.divert(None, Some(&*route), surface, err, Phase::Instantiate, dispatch_id);
                return self.complete(response, None, dispatch_id, Some(&*route), start);
            }
        };

        let mut ctx = ControllerContext::new(
            request,
            &route,
            self.urls(),
            self.config,
            self.session,
            dispatch_id,
        );
        let phase = Cell::new(Phase::Prepare);
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.run_lifecycle(controller.as_mut(), &mut ctx, &route, request, &phase)
        }))
        .unwrap_or_else(|panic| {
            Err(DispatchError::System(anyhow::anyhow!(
                "controller panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        let mut response = match result {
            Ok(response) => response,
            Err(err) => self.divert(
                Some(controller.as_ref()),
                Some(&*route),
                surface,
                err,
                phase.get(),
                dispatch_id,
            ),
        };

        let output = ctx.take_output();
        let stray_output = if output.is_empty() {
            None
        } else if controller.captures_output() {
            response.set_controller_output(output);
            None
        } else {
            Some(output)
        };
        self.complete(response, stray_output, dispatch_id, Some(&*route), start)
    }

    fn run_lifecycle(
        &self,
        controller: &mut dyn Controller,
        ctx: &mut ControllerContext<'_>,
        route: &Route,
        request: &Request,
        phase: &Cell<Phase>,
    ) -> Result<Response, DispatchError> {
        if request.surface() == Surface::Http
            && controller.uses_session()
            && route.option_bool("session", true)
        {
            self.session.start();
        }

        phase.set(Phase::Prepare);
        controller.prepare(ctx)?;

        if self.config.check_access {
            phase.set(Phase::Access);
            if !self.registry.is_accessible(route, request)? {
                return Err(DispatchError::forbidden(route.name().to_string()));
            }
        }

        phase.set(Phase::PreRun);
        if let Some(response) = controller.pre_run(ctx)? {
            debug!(
                dispatch_id = %ctx.dispatch_id(),
                route = %route.name(),
                "pre_run short-circuited the request"
            );
            return Ok(response);
        }

        phase.set(Phase::Run);
        let mut response = controller.run(ctx)?;

        phase.set(Phase::PostRun);
        controller.post_run(ctx, &mut response)?;
        Ok(response)
    }

    /// Turn `err` into a response.
    ///
    /// Order: the controller's handler, the route's output format, then the surface's
    /// default controller, then the built-in responder of the surface.
    fn divert(
        &self,
        controller: Option<&dyn Controller>,
        route: Option<&Route>,
        surface: Surface,
        err: DispatchError,
        phase: Phase,
        dispatch_id: DispatchId,
    ) -> Response {
        let err = match err {
            DispatchError::Forced { reason, response } => {
                info!(
                    dispatch_id = %dispatch_id,
                    phase = %phase,
                    reason = %reason,
                    "Response forced"
                );
                return *response;
            }
            other => other,
        };

        let user_facing = err.is_user_facing();
        if user_facing {
            info!(
                dispatch_id = %dispatch_id,
                phase = %phase,
                route = route.map_or("-", Route::name),
                kind = err.kind(),
                status = err.status(),
                message = %err,
                "User error"
            );
        } else {
            self.report(&err, phase, dispatch_id, route.map(Route::name));
        }

        let ctx = self.error_context();
        let handle = |c: &dyn Controller| {
            if user_facing {
                c.handle_user_error(&err, &ctx)
            } else {
                c.handle_system_error(&err, &ctx)
            }
        };

        if let Some(response) =
            controller.and_then(|c| guard(dispatch_id, "controller error handler", || handle(c)))
        {
            return response;
        }
        if let Some(route) = route {
            return Response::from_error(output_format(surface, route.output()), &err, &ctx);
        }
        guard(dispatch_id, "default controller error handler", || {
            handle(self.registry.default_controller(surface).as_ref())
        })
        .unwrap_or_else(|| {
            Response::from_error(output_format(surface, OutputFormat::Html), &err, &ctx)
        })
    }

    /// Report a system error; a panicking reporter is logged and otherwise ignored.
    fn report(&self, err: &DispatchError, phase: Phase, dispatch_id: DispatchId, route: Option<&str>) {
        let reported = catch_unwind(AssertUnwindSafe(|| {
            self.reporter.report(err, phase, dispatch_id, route);
        }));
        if let Err(panic) = reported {
            error!(
                dispatch_id = %dispatch_id,
                panic = %panic_message(panic.as_ref()),
                "Error reporter panicked"
            );
        }
    }

    fn complete(
        &self,
        response: Response,
        stray_output: Option<String>,
        dispatch_id: DispatchId,
        route: Option<&Route>,
        start: Instant,
    ) -> Dispatched {
        info!(
            dispatch_id = %dispatch_id,
            route = route.map_or("-", Route::name),
            status = response.code(),
            response = response.variant(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Dispatch complete"
        );
        Dispatched {
            response,
            stray_output,
            dispatch_id,
        }
    }

    /// Dispatch `request` and send the result to `transport`.
    ///
    /// If sending fails, the error goes once more through the default controller and that
    /// response is sent instead. If this fails too, [`FALLBACK_MESSAGE`] is emitted and the
    /// outcome is marked fatal.
    pub fn handle(&self, request: &Request, transport: &mut dyn Transport) -> Outcome {
        let surface = request.surface();
        let Dispatched {
            mut response,
            stray_output,
            dispatch_id,
        } = self.dispatch(request);

        if let Some(stray) = stray_output {
            if let Err(e) = transport.write_stray(&stray) {
                warn!(dispatch_id = %dispatch_id, error = %e, "Failed to write controller output");
            }
        }

        let send_ctx = SendContext {
            renderer: self.renderer,
            session: self.session,
        };
        let send_err = match send_guarded(&mut response, transport, &send_ctx) {
            Ok(()) => {
                return Outcome {
                    code: response.code(),
                    fatal: false,
                    dispatch_id,
                }
            }
            Err(e) => e,
        };

        let err = DispatchError::System(send_err.context("sending response failed"));
        self.report(&err, Phase::Send, dispatch_id, request.route_name());
        let ctx = self.error_context();
        let mut fallback = guard(dispatch_id, "default controller error handler", || {
            self.registry
                .default_controller(surface)
                .handle_system_error(&err, &ctx)
        })
        .unwrap_or_else(|| {
            Response::from_error(output_format(surface, OutputFormat::Html), &err, &ctx)
        });

        match send_guarded(&mut fallback, transport, &send_ctx) {
            Ok(()) => Outcome {
                code: fallback.code(),
                fatal: false,
                dispatch_id,
            },
            Err(e) => {
                error!(
                    dispatch_id = %dispatch_id,
                    error = %format!("{e:#}"),
                    "Fallback response could not be sent"
                );
                let emitted =
                    catch_unwind(AssertUnwindSafe(|| transport.emit_fallback(FALLBACK_MESSAGE)));
                if emitted.is_err() {
                    error!(dispatch_id = %dispatch_id, "Transport panicked emitting the fallback message");
                }
                Outcome {
                    code: match surface {
                        Surface::Http => 500,
                        Surface::Cli => CLI_ERROR_CODE,
                    },
                    fatal: true,
                    dispatch_id,
                }
            }
        }
    }
}

/// Send `response`, turning a panic in the renderer, session or transport into an error.
fn send_guarded(
    response: &mut Response,
    transport: &mut dyn Transport,
    ctx: &SendContext<'_>,
) -> anyhow::Result<()> {
    match catch_unwind(AssertUnwindSafe(|| response.send(transport, ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::Error::new(e)),
        Err(panic) => Err(anyhow::anyhow!(
            "panicked while sending: {}",
            panic_message(panic.as_ref())
        )),
    }
}

/// Run an error handler; a panic is logged and treated as "no response".
fn guard(
    dispatch_id: DispatchId,
    what: &str,
    f: impl FnOnce() -> Option<Response>,
) -> Option<Response> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        error!(
            dispatch_id = %dispatch_id,
            handler = what,
            panic = %panic_message(panic.as_ref()),
            "Error handler panicked"
        );
        None
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// CLI requests always answer in text; HTTP requests use the route's format.
fn output_format(surface: Surface, route_output: OutputFormat) -> OutputFormat {
    match surface {
        Surface::Cli => OutputFormat::Cli,
        Surface::Http => route_output,
    }
}
