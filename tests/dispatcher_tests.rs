//! Tests for the dispatcher lifecycle and error diversion
//!
//! # Test Coverage
//!
//! - Lifecycle order: prepare → access → pre_run → run → post_run
//! - `pre_run` short-circuit skips `run` and `post_run`
//! - User-facing errors never reach the error reporter; system errors reach it exactly once
//! - Controller panics become system errors
//! - Forced responses, forbidden redirects, not-found fallbacks
//! - Send failure: re-send through the default controller, then the last-resort message
//! - Panicking error handlers, renderers and reporters never escape `handle`
//! - Stray versus captured controller output
//! - Session start and request id propagation

mod common;

use brrtdispatch::controller::{Controller, ControllerContext};
use brrtdispatch::dispatcher::{
    Dispatcher, ErrorReporter, Phase, FALLBACK_MESSAGE, REQUEST_ID_HEADER,
};
use brrtdispatch::error::DispatchError;
use brrtdispatch::ids::DispatchId;
use brrtdispatch::request::{CliRequest, HttpRequest, Request};
use brrtdispatch::response::{BufferedTransport, ErrorContext, LayoutRenderer, Response};
use brrtdispatch::route::{CliRouteConfig, HttpRouteConfig, RegistryBuilder, RouteRegistry};
use brrtdispatch::runtime_config::AppConfig;
use brrtdispatch::session::MemorySession;
use common::controllers::{calls, recorded, Calls, Chatty, Failing, Spy};
use common::reporting::CountingReporter;
use common::transports::FailingTransport;
use http::Method;
use serde_json::{json, Value};

/// Fails in `run`, then panics in its own system error handler.
struct BrokenHandler;

impl Controller for BrokenHandler {
    fn run(&mut self, _ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        Err(DispatchError::System(anyhow::anyhow!("disk full")))
    }

    fn handle_system_error(&self, _err: &DispatchError, _ctx: &ErrorContext) -> Option<Response> {
        panic!("error handler blew up")
    }
}

/// Answers with a deferred layout.
struct Page;

impl Controller for Page {
    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        Ok(ctx.render("page", json!({})))
    }
}

/// Knows no layouts and panics when asked to render one.
struct PanickingRenderer;

impl LayoutRenderer for PanickingRenderer {
    fn has_layout(&self, _layout: &str) -> bool {
        false
    }

    fn render(&self, layout: &str, _values: &Value) -> anyhow::Result<String> {
        panic!("renderer crashed on {layout}")
    }
}

struct PanickingReporter;

impl ErrorReporter for PanickingReporter {
    fn report(&self, _: &DispatchError, _: Phase, _: DispatchId, _: Option<&str>) {
        panic!("reporter crashed")
    }
}

fn registry(calls: &Calls) -> RouteRegistry {
    let spy_calls = calls.clone();
    let mut builder = RegistryBuilder::new();
    builder
        .register_controller("spy", move |_| {
            Box::new(Spy {
                calls: spy_calls.clone(),
            })
        })
        .register_controller("failing", |_| Box::new(Failing))
        .register_controller("chatty", |_| Box::new(Chatty { capture: false }))
        .register_controller("chatty_capture", |_| Box::new(Chatty { capture: true }))
        .register_controller("broken_handler", |_| Box::new(BrokenHandler))
        .register_controller("page", |_| Box::new(Page))
        .register_restriction("header", |_, options, request| {
            let name = options.as_str().unwrap_or_default();
            request.as_http().and_then(|h| h.header(name)).is_some()
        });
    builder
        .register_http(
            "home",
            HttpRouteConfig::new("/", "spy").with_method("GET"),
        )
        .unwrap()
        .register_http(
            "item",
            HttpRouteConfig::new("/items/{int:id}", "spy").with_output("json"),
        )
        .unwrap()
        .register_http(
            "cached",
            HttpRouteConfig::new("/cached", "spy")
                .with_output("json")
                .with_option("short_circuit", Value::Bool(true)),
        )
        .unwrap()
        .register_http(
            "fail_user",
            HttpRouteConfig::new("/fail/user", "failing")
                .with_output("json")
                .with_option("fail", json!("user")),
        )
        .unwrap()
        .register_http(
            "fail_system",
            HttpRouteConfig::new("/fail/system", "failing")
                .with_output("json")
                .with_option("fail", json!("system")),
        )
        .unwrap()
        .register_http(
            "fail_panic",
            HttpRouteConfig::new("/fail/panic", "failing")
                .with_output("json")
                .with_option("fail", json!("panic")),
        )
        .unwrap()
        .register_http(
            "fail_forced",
            HttpRouteConfig::new("/fail/forced", "failing").with_option("fail", json!("forced")),
        )
        .unwrap()
        .register_http(
            "fail_missing",
            HttpRouteConfig::new("/fail/missing", "failing")
                .with_option("fail", json!("not-found")),
        )
        .unwrap()
        .register_http(
            "admin",
            HttpRouteConfig::new("/admin", "spy").with_restriction("header", json!("x-admin")),
        )
        .unwrap()
        .register_http(
            "sessionless",
            HttpRouteConfig::new("/sessionless", "spy").with_option("session", Value::Bool(false)),
        )
        .unwrap()
        .register_http(
            "broken_handler",
            HttpRouteConfig::new("/broken/handler", "broken_handler").with_output("json"),
        )
        .unwrap()
        .register_http("page", HttpRouteConfig::new("/page", "page"))
        .unwrap()
        .register_cli("chatty", CliRouteConfig::new("chatty", "chatty"))
        .unwrap()
        .register_cli("chatty_capture", CliRouteConfig::new("chatty/capture", "chatty_capture"))
        .unwrap()
        .register_cli("fail", CliRouteConfig::new("fail", "failing"))
        .unwrap();
    builder.build().unwrap()
}

fn get(path: &str) -> Request {
    HttpRequest::new(Method::GET, path).into()
}

fn json_body(transport: &BufferedTransport) -> Value {
    serde_json::from_slice(&transport.body).unwrap()
}

#[test]
fn test_lifecycle_runs_in_order() {
    let calls = calls();
    let registry = registry(&calls);
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/items/42"), &mut transport);

    assert_eq!(outcome.code, 200);
    assert!(!outcome.fatal);
    assert_eq!(recorded(&calls), vec!["prepare", "pre_run", "run", "post_run"]);
    assert_eq!(transport.header("x-post-run"), Some("1"));
    let body = json_body(&transport);
    assert_eq!(body["route"], "item");
    assert_eq!(body["values"]["id"], "42");
}

#[test]
fn test_pre_run_short_circuits() {
    let calls = calls();
    let registry = registry(&calls);
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let mut transport = BufferedTransport::new();
    dispatcher.handle(&get("/cached"), &mut transport);

    assert_eq!(recorded(&calls), vec!["prepare", "pre_run"]);
    assert_eq!(json_body(&transport), json!({"cached": true}));
    assert_eq!(transport.header("x-post-run"), None);
}

#[test]
fn test_user_error_is_not_reported() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/user"), &mut transport);

    assert_eq!(outcome.code, 400);
    assert_eq!(reporter.count(), 0);
    let body = json_body(&transport);
    assert_eq!(body["code"], "user");
    assert_eq!(body["description"], "name is required");
}

#[test]
fn test_system_error_reported_once() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/system"), &mut transport);

    assert_eq!(outcome.code, 500);
    assert_eq!(reporter.phases(), vec![Phase::Run]);
    let body = json_body(&transport);
    assert_eq!(body["code"], "exception");
    assert_eq!(body["description"], "An internal error occurred.");
    assert_eq!(body["other"], Value::Null);
}

#[test]
fn test_system_error_details_in_debug() {
    let registry = registry(&calls());
    let config = AppConfig {
        debug: true,
        ..AppConfig::default()
    };
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    dispatcher.handle(&get("/fail/system"), &mut transport);

    let body = json_body(&transport);
    assert_eq!(body["description"], "database unreachable");
    assert!(body["other"].as_str().unwrap().contains("database unreachable"));
}

#[test]
fn test_panic_becomes_system_error() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/panic"), &mut transport);

    assert_eq!(outcome.code, 500);
    assert_eq!(reporter.count(), 1);
    let reports = reporter.reports.lock().unwrap();
    assert!(reports[0].1.contains("controller exploded"));
}

#[test]
fn test_forced_response_is_sent_as_is() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/forced"), &mut transport);

    assert_eq!(outcome.code, 3);
    assert_eq!(transport.body_text(), "down for maintenance\n");
    assert_eq!(reporter.count(), 0);
}

#[test]
fn test_unmatched_request_is_not_found() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/nowhere"), &mut transport);

    assert_eq!(outcome.code, 404);
    assert_eq!(reporter.count(), 0);
    assert!(transport.body_text().contains("Not found: /nowhere"));
    assert!(transport.body_text().contains("error/error-not-found-404"));
}

#[test]
fn test_not_found_from_html_controller() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/missing"), &mut transport);

    assert_eq!(outcome.code, 404);
    assert_eq!(transport.header("content-type"), Some("text/html; charset=utf-8"));
}

#[test]
fn test_forbidden_and_redirect_to_home() {
    let calls = calls();
    let registry = registry(&calls);
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let mut transport = BufferedTransport::new();
    assert_eq!(dispatcher.handle(&get("/admin"), &mut transport).code, 403);
    // prepare ran, run did not
    assert_eq!(recorded(&calls), vec!["prepare"]);

    let allowed: Request = HttpRequest::new(Method::GET, "/admin")
        .with_header("x-admin", "yes")
        .into();
    let mut transport = BufferedTransport::new();
    assert_eq!(dispatcher.handle(&allowed, &mut transport).code, 200);

    let config = AppConfig {
        forbidden_to_home: true,
        web_root: "https://example.com".to_string(),
        ..AppConfig::default()
    };
    let dispatcher = Dispatcher::new(&registry, &config);
    let mut transport = BufferedTransport::new();
    assert_eq!(dispatcher.handle(&get("/admin"), &mut transport).code, 302);
    assert_eq!(transport.header("location"), Some("https://example.com/"));
}

#[test]
fn test_access_check_can_be_disabled() {
    let registry = registry(&calls());
    let config = AppConfig {
        check_access: false,
        ..AppConfig::default()
    };
    let dispatcher = Dispatcher::new(&registry, &config);
    let mut transport = BufferedTransport::new();
    assert_eq!(dispatcher.handle(&get("/admin"), &mut transport).code, 200);
}

#[test]
fn test_send_failure_falls_back_to_default_controller() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = FailingTransport::new(1);
    let outcome = dispatcher.handle(&get("/items/1"), &mut transport);

    assert!(!outcome.fatal);
    assert_eq!(outcome.code, 500);
    assert_eq!(reporter.phases(), vec![Phase::Send]);
    assert_eq!(transport.inner.status, Some(500));
    assert!(transport.inner.body_text().contains("An internal error occurred."));
    assert!(transport.inner.fallback.is_none());
}

#[test]
fn test_double_send_failure_emits_fallback() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = FailingTransport::new(2);
    let outcome = dispatcher.handle(&get("/items/1"), &mut transport);

    assert!(outcome.fatal);
    assert_eq!(outcome.code, 500);
    assert_eq!(transport.inner.fallback.as_deref(), Some(FALLBACK_MESSAGE));
    assert_eq!(reporter.count(), 1);

    let cli: Request = CliRequest::new("chatty", &[]).into();
    let mut transport = FailingTransport::new(2);
    let outcome = dispatcher.handle(&cli, &mut transport);
    assert!(outcome.fatal);
    assert_eq!(outcome.code, 1);
}

#[test]
fn test_panicking_error_handler_falls_through() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/broken/handler"), &mut transport);

    assert!(!outcome.fatal);
    assert_eq!(outcome.code, 500);
    assert_eq!(json_body(&transport)["code"], "exception");
    assert_eq!(reporter.phases(), vec![Phase::Run]);
}

#[test]
fn test_panicking_renderer_is_a_send_failure() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let renderer = PanickingRenderer;
    let dispatcher = Dispatcher::new(&registry, &config)
        .with_renderer(&renderer)
        .with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/page"), &mut transport);

    assert!(!outcome.fatal);
    assert_eq!(outcome.code, 500);
    assert_eq!(reporter.phases(), vec![Phase::Send]);
    assert!(transport.body_text().contains("Error 500"));
    assert!(transport.fallback.is_none());
}

#[test]
fn test_panicking_reporter_does_not_escape() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = PanickingReporter;
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&get("/fail/system"), &mut transport);
    assert!(!outcome.fatal);
    assert_eq!(outcome.code, 500);
}

#[test]
fn test_stray_output_precedes_response() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&CliRequest::new("chatty", &[]).into(), &mut transport);

    assert_eq!(outcome.code, 0);
    assert_eq!(transport.stray, "working...\n");
    assert_eq!(
        String::from_utf8(transport.output()).unwrap(),
        "working...\ndone\n"
    );
}

#[test]
fn test_captured_output_is_attached() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let dispatched = dispatcher.dispatch(&CliRequest::new("chatty/capture", &[]).into());
    assert!(dispatched.stray_output.is_none());
    assert_eq!(dispatched.response.controller_output(), Some("working...\n"));
    assert!(matches!(dispatched.response, Response::Cli(_)));
}

#[test]
fn test_cli_errors_exit_with_one() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&CliRequest::new("fail", &[]).into(), &mut transport);
    assert_eq!(outcome.code, 1);
    assert_eq!(transport.body_text(), "Error: an internal error occurred.\n");
    assert_eq!(reporter.count(), 1);

    let mut transport = BufferedTransport::new();
    let outcome = dispatcher.handle(&CliRequest::new("unknown/cmd", &[]).into(), &mut transport);
    assert_eq!(outcome.code, 1);
    assert!(transport.body_text().starts_with("Error: Not found: command \"unknown/cmd\""));
    assert_eq!(reporter.count(), 1);
}

#[test]
fn test_session_started_for_http_controllers() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let session = MemorySession::new();
    let dispatcher = Dispatcher::new(&registry, &config).with_session(&session);

    dispatcher.handle(&get("/"), &mut BufferedTransport::new());
    assert_eq!(session.start_count(), 1);

    dispatcher.handle(&get("/sessionless"), &mut BufferedTransport::new());
    dispatcher.handle(&CliRequest::new("chatty", &[]).into(), &mut BufferedTransport::new());
    assert_eq!(session.start_count(), 1);
}

#[test]
fn test_request_id_header_is_reused() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let dispatcher = Dispatcher::new(&registry, &config);

    let id = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    let request: Request = HttpRequest::new(Method::GET, "/")
        .with_header(REQUEST_ID_HEADER, id)
        .into();
    let outcome = dispatcher.handle(&request, &mut BufferedTransport::new());
    assert_eq!(outcome.dispatch_id.to_string(), id);
}

#[test]
fn test_request_cannot_be_dispatched_twice() {
    let registry = registry(&calls());
    let config = AppConfig::default();
    let reporter = CountingReporter::default();
    let dispatcher = Dispatcher::new(&registry, &config).with_reporter(&reporter);

    let request = get("/items/5");
    assert_eq!(dispatcher.handle(&request, &mut BufferedTransport::new()).code, 200);
    assert_eq!(request.route_name(), Some("item"));

    let outcome = dispatcher.handle(&request, &mut BufferedTransport::new());
    assert_eq!(outcome.code, 500);
    assert_eq!(reporter.phases(), vec![Phase::Resolve]);
}
