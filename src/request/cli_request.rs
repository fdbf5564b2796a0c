use super::RouteBinding;
use crate::pattern::normalize_command_path;
use once_cell::unsync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{IsTerminal, Read};

/// Output verbosity of a CLI invocation; the discriminant is the bit used by log filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum Verbosity {
    Quiet = 16,
    #[default]
    Normal = 32,
    Verbose = 64,
    VeryVerbose = 128,
    Debug = 256,
}

impl Verbosity {
    /// Level for `-v` repeated `count` times.
    #[must_use]
    pub fn from_count(count: u64) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::VeryVerbose,
            _ => Self::Debug,
        }
    }

    #[must_use]
    pub fn at_least(self, level: Verbosity) -> bool {
        self >= level
    }
}

/// A command-line invocation: `program <path> [flags...] [--] [arguments...]`.
#[derive(Debug, Clone)]
pub struct CliRequest {
    path: String,
    parameters: Map<String, Value>,
    arguments: Vec<String>,
    input: Option<String>,
    verbosity: Verbosity,
    dry_run: bool,
    pub(super) binding: OnceCell<RouteBinding>,
}

impl CliRequest {
    /// Build from a full argv: element 0 is the program, element 1 the route path.
    pub fn from_args<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into).skip(1);
        let path = argv.next().unwrap_or_default();
        let rest: Vec<String> = argv.collect();
        Self::new(path, &rest)
    }

    /// Build from the process arguments, capturing stdin when it is piped.
    pub fn from_env() -> std::io::Result<Self> {
        Self::from_args(std::env::args()).with_piped_input()
    }

    /// Attach stdin as input when it is not a terminal.
    pub fn with_piped_input(self) -> std::io::Result<Self> {
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Ok(self);
        }
        let mut input = String::new();
        stdin.lock().read_to_string(&mut input)?;
        Ok(self.with_input(input))
    }

    /// Build for route `path` with raw flag arguments.
    pub fn new(path: impl Into<String>, args: &[String]) -> Self {
        let path: String = path.into();
        let (parameters, arguments) = parse_arguments(args);
        let dry_run = parameters.get("dry-run").is_some_and(is_truthy);
        let verbosity = if dry_run {
            Verbosity::Debug
        } else if parameters.get("quiet").or_else(|| parameters.get("q")).is_some_and(is_truthy) {
            Verbosity::Quiet
        } else {
            let count = parameters
                .get("verbose")
                .or_else(|| parameters.get("v"))
                .map_or(0, flag_count);
            Verbosity::from_count(count)
        };
        Self {
            path: normalize_command_path(&path),
            parameters,
            arguments,
            input: None,
            verbosity,
            dry_run,
            binding: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parsed flags.
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Positional arguments left after flag parsing stopped.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Piped standard input, if any.
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_u64().is_some_and(|n| n > 0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

fn flag_count(value: &Value) -> u64 {
    match value {
        Value::Bool(true) => 1,
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(1),
        _ => 0,
    }
}

/// Parse flag arguments into `(parameters, leftover positional arguments)`.
///
/// - `--name=value` sets a value; `--name` sets `true` and may take the next positional as
///   its value; `--not-name` / `--no-name` set `false`
/// - `-abc` sets each short flag; repeating a set flag increments it (`-vv` → 2)
/// - `!` negates a short flag: `-!a` or `-a!` set `a` to `false`
/// - `-o=value` gives the last short flag a value
/// - `--` stops parsing; so does the first positional no flag is waiting for
#[must_use]
pub fn parse_arguments(args: &[String]) -> (Map<String, Value>, Vec<String>) {
    let mut parameters = Map::new();
    let mut pending: Option<String> = None;
    let mut index = 0;

    while let Some(arg) = args.get(index) {
        index += 1;
        if arg == "--" {
            break;
        }
        let waiting = pending.take();

        if let Some(long) = arg.strip_prefix("--") {
            match long.split_once('=') {
                Some((name, value)) => {
                    parameters.insert(name.to_string(), Value::String(value.to_string()));
                }
                None => {
                    let negated = long.strip_prefix("not-").or_else(|| long.strip_prefix("no-"));
                    match negated {
                        Some(name) if !name.is_empty() => {
                            parameters.insert(name.to_string(), Value::Bool(false));
                        }
                        _ => {
                            parameters.insert(long.to_string(), Value::Bool(true));
                            pending = Some(long.to_string());
                        }
                    }
                }
            }
        } else if let Some(short) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
            let (flags, value) = match short.split_once('=') {
                Some((flags, value)) => (flags, Some(value)),
                None => (short, None),
            };
            let mut last: Option<String> = None;
            let mut negate_next = false;
            for c in flags.chars() {
                if c == '!' {
                    match last.take() {
                        // Trailing `!` negates the flag just set
                        Some(name) if !negate_next => {
                            parameters.insert(name, Value::Bool(false));
                            pending = None;
                        }
                        _ => negate_next = true,
                    }
                    continue;
                }
                let name = c.to_string();
                if negate_next {
                    parameters.insert(name.clone(), Value::Bool(false));
                    pending = None;
                    negate_next = false;
                } else {
                    let next = match parameters.get(&name) {
                        Some(current) if is_truthy(current) => {
                            Value::from(flag_count(current).max(1) + 1)
                        }
                        _ => Value::Bool(true),
                    };
                    parameters.insert(name.clone(), next);
                    pending = Some(name.clone());
                }
                last = Some(name);
            }
            if let (Some(value), Some(name)) = (value, last) {
                parameters.insert(name, Value::String(value.to_string()));
                pending = None;
            }
        } else if let Some(name) = waiting {
            parameters.insert(name, Value::String(arg.clone()));
        } else {
            index -= 1;
            break;
        }
    }

    (parameters, args[index..].to_vec())
}
