//! CLI surface tests: flag parsing, declared parameter verification and command dispatch

mod common;

use brrtdispatch::app::Application;
use brrtdispatch::controller::{Controller, ControllerContext};
use brrtdispatch::error::DispatchError;
use brrtdispatch::request::{CliRequest, Verbosity};
use brrtdispatch::response::{BufferedTransport, CliResponse, Response};
use brrtdispatch::route::CliRouteConfig;
use brrtdispatch::runtime_config::AppConfig;
use serde_json::{json, Map, Value};

/// Greets `--name`, `--count` times; `--usage` prints the declared parameters.
#[derive(Default)]
struct Greet {
    verified: Map<String, Value>,
}

impl Controller for Greet {
    fn prepare(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), DispatchError> {
        if ctx.cli()?.parameter("usage").is_some() {
            return Err(DispatchError::force(
                "usage",
                CliResponse::ok(ctx.usage()).into(),
            ));
        }
        self.verified = ctx.verify_arguments()?;
        Ok(())
    }

    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let cli = ctx.cli()?;
        let name = self.verified["name"].as_str().unwrap_or_default();
        let count = self.verified.get("count").and_then(Value::as_u64).unwrap_or(1);
        let loud = self.verified.get("loud").and_then(Value::as_bool).unwrap_or(false);

        let mut text = vec![format!("Hello {name}"); count as usize].join(" ");
        if loud {
            text.push('!');
        }
        if cli.verbosity().at_least(Verbosity::Verbose) {
            text.push_str(&format!(" [{}]", cli.arguments().join(",")));
        }
        if let Some(input) = cli.input() {
            text.push_str(&format!(" <{}>", input.trim()));
        }
        Ok(CliResponse::ok(text).into())
    }
}

/// Echoes the bound path values.
struct Export;

impl Controller for Export {
    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
        let id = ctx.path_value("id").unwrap_or_default();
        let format = ctx.request().parameter("format").unwrap_or(json!("json"));
        Ok(CliResponse::ok(format!("export {id} as {}", format.as_str().unwrap_or_default())).into())
    }
}

fn app() -> Application {
    let mut app = Application::new(AppConfig {
        cli_root_command: String::new(),
        ..AppConfig::default()
    })
    .without_route_files();
    app.builder_mut()
        .register_controller("greet", |_| Box::new(Greet::default()))
        .register_controller("export", |_| Box::new(Export))
        .register_cli(
            "greet",
            CliRouteConfig::new("greet", "greet")
                .with_parameter("name", "+n")
                .with_parameter("count", "c:int")
                .with_parameter("loud", ":bool"),
        )
        .unwrap()
        .register_cli(
            "user_export",
            CliRouteConfig::new("users/{int:id}/export", "export")
                .with_parameter("format", ":string"),
        )
        .unwrap();
    app
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn run(app: &Application, request: CliRequest) -> (u16, String) {
    let mut transport = BufferedTransport::new();
    let outcome = app.handle_cli(request, &mut transport).unwrap();
    (outcome.code, transport.body_text())
}

#[test]
fn test_declared_parameters_are_verified() {
    let app = app();
    let (code, body) = run(
        &app,
        CliRequest::new("greet", &args(&["--name=Ada", "-c", "2", "--loud"])),
    );
    assert_eq!(code, 0);
    assert_eq!(body, "Hello Ada Hello Ada!\n");

    let (code, body) = run(&app, CliRequest::new("greet", &args(&["-n", "Bo", "--not-loud"])));
    assert_eq!(code, 0);
    assert_eq!(body, "Hello Bo\n");
}

#[test]
fn test_missing_required_parameter() {
    let (code, body) = run(&app(), CliRequest::new("greet", &args(&["--loud"])));
    assert_eq!(code, 1);
    assert_eq!(body, "Error: The parameter \"--name\" is required\n");
}

#[test]
fn test_invalid_parameter_value() {
    let (code, body) = run(&app(), CliRequest::new("greet", &args(&["-n", "Ada", "-c", "many"])));
    assert_eq!(code, 1);
    assert_eq!(
        body,
        "Error: The value \"many\" of parameter \"--count\" is not a valid int\n"
    );
}

#[test]
fn test_flag_without_value_is_rejected() {
    let (code, body) = run(&app(), CliRequest::new("greet", &args(&["--name"])));
    assert_eq!(code, 1);
    assert!(body.contains("requires a value of type string"));
}

#[test]
fn test_usage_lists_declared_parameters() {
    let (code, body) = run(&app(), CliRequest::new("greet", &args(&["--usage"])));
    assert_eq!(code, 0);
    assert_eq!(
        body,
        "greet -n|--name=\"string\" [-c|--count=\"int\"] [--(not-)loud]\n"
    );
}

#[test]
fn test_verbosity_and_positional_arguments() {
    let request = CliRequest::new("greet", &args(&["-n", "Ada", "-vv", "--", "--raw", "file.txt"]));
    assert_eq!(request.verbosity(), Verbosity::VeryVerbose);
    assert_eq!(request.arguments(), &["--raw".to_string(), "file.txt".to_string()]);

    let (_, body) = run(&app(), request);
    assert_eq!(body, "Hello Ada [--raw,file.txt]\n");
}

#[test]
fn test_dry_run_forces_debug_verbosity() {
    let request = CliRequest::new("greet", &args(&["--dry-run", "-q"]));
    assert!(request.is_dry_run());
    assert_eq!(request.verbosity(), Verbosity::Debug);

    let quiet = CliRequest::new("greet", &args(&["-q"]));
    assert_eq!(quiet.verbosity(), Verbosity::Quiet);
}

#[test]
fn test_input_is_available_to_controller() {
    let request = CliRequest::new("greet", &args(&["-n", "Ada"])).with_input("piped\n");
    let (_, body) = run(&app(), request);
    assert_eq!(body, "Hello Ada <piped>\n");
}

#[test]
fn test_path_values_bind_on_cli_routes() {
    let app = app();
    let (code, body) = run(
        &app,
        CliRequest::new("users/7/export", &args(&["--format", "csv"])),
    );
    assert_eq!(code, 0);
    assert_eq!(body, "export 7 as csv\n");

    let (code, _) = run(&app, CliRequest::new("users/seven/export", &[]));
    assert_eq!(code, 1);
}

#[test]
fn test_generated_command_dispatches_to_same_route() {
    let app = app();
    let mut values = Map::new();
    values.insert("id".to_string(), json!("12"));
    values.insert("format".to_string(), json!("xml"));
    let command = app.urls().unwrap().command("user_export", &values).unwrap();
    assert_eq!(command, "users/12/export --format=xml");

    let argv = std::iter::once("brrtdispatch").chain(command.split_whitespace());
    let (code, body) = run(&app, CliRequest::from_args(argv));
    assert_eq!(code, 0);
    assert_eq!(body, "export 12 as xml\n");
}

#[test]
fn test_from_args_skips_program_name() {
    let request = CliRequest::from_args(["prog", "cache/clear", "-abo=out.txt", "rest"]);
    assert_eq!(request.path(), "cache/clear");
    assert_eq!(request.parameter("a"), Some(&json!(true)));
    assert_eq!(request.parameter("b"), Some(&json!(true)));
    assert_eq!(request.parameter("o"), Some(&json!("out.txt")));
    assert_eq!(request.arguments(), &["rest".to_string()]);
}
