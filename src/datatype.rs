//! Typed values for CLI parameters.
//!
//! A [`DataType`] validates human input, parses it to a machine value and formats it back.
//! For every built-in type `parse(format(v)) == v`.

use crate::error::{ConfigError, UserError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

static INTEGER_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+$").ok());
static BOOLEAN_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(?:true|false|[01]|yes|no|on|off)$").ok());

/// Behaviour of one named value type.
pub trait DataType: Send + Sync + fmt::Debug {
    /// Registry key (`string`, `int`, `bool`, `file`)
    fn name(&self) -> &str;

    /// Whether `value` is acceptable human input for this type.
    fn validate(&self, value: &str) -> bool;

    /// Human input to machine value.
    fn parse(&self, value: &str) -> Value;

    /// Machine value to human text.
    fn format(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Falsable types accept `--not-name` / `--no-name`.
    fn is_falsable(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct StringType;

impl DataType for StringType {
    fn name(&self) -> &str {
        "string"
    }

    fn validate(&self, _value: &str) -> bool {
        true
    }

    fn parse(&self, value: &str) -> Value {
        Value::String(value.to_string())
    }
}

#[derive(Debug, Default)]
pub struct IntegerType;

impl DataType for IntegerType {
    fn name(&self) -> &str {
        "int"
    }

    fn validate(&self, value: &str) -> bool {
        INTEGER_RE.as_ref().is_some_and(|re| re.is_match(value))
    }

    fn parse(&self, value: &str) -> Value {
        value
            .parse::<u64>()
            .map_or_else(|_| Value::String(value.to_string()), Value::from)
    }
}

#[derive(Debug, Default)]
pub struct BooleanType;

impl BooleanType {
    fn truthy(value: &str) -> bool {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" | "" => false,
            _ => true,
        }
    }
}

impl DataType for BooleanType {
    fn name(&self) -> &str {
        "bool"
    }

    fn validate(&self, value: &str) -> bool {
        BOOLEAN_RE.as_ref().is_some_and(|re| re.is_match(value))
    }

    fn parse(&self, value: &str) -> Value {
        Value::Bool(Self::truthy(value))
    }

    fn format(&self, value: &Value) -> String {
        let truthy = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => Self::truthy(s),
            Value::Null => false,
            _ => true,
        };
        let text = if truthy { "true" } else { "false" };
        text.to_string()
    }

    fn is_falsable(&self) -> bool {
        true
    }
}

/// A path that must name a readable regular file.
#[derive(Debug, Default)]
pub struct FileType;

impl DataType for FileType {
    fn name(&self) -> &str {
        "file"
    }

    fn validate(&self, value: &str) -> bool {
        let path = Path::new(value);
        path.is_file() && File::open(path).is_ok()
    }

    fn parse(&self, value: &str) -> Value {
        Value::String(value.to_string())
    }
}

/// Named data types available to CLI parameter declarations.
#[derive(Debug, Clone)]
pub struct DataTypeRegistry {
    types: HashMap<String, Arc<dyn DataType>>,
}

impl Default for DataTypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            types: HashMap::new(),
        };
        registry.register(Arc::new(StringType));
        registry.register(Arc::new(IntegerType));
        registry.register(Arc::new(BooleanType));
        registry.register(Arc::new(FileType));
        registry
    }
}

impl DataTypeRegistry {
    pub fn register(&mut self, data_type: Arc<dyn DataType>) {
        self.types.insert(data_type.name().to_string(), data_type);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DataType>> {
        self.types.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

/// A declared CLI parameter: `--long`, an optional `-s` short alias and a value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgument {
    pub long: String,
    pub short: Option<char>,
    pub type_name: String,
    pub required: bool,
}

impl CliArgument {
    /// Parse a declaration such as `+s:int` (required, short `-s`, integer).
    ///
    /// Grammar: `[+][short][:type]`; the type defaults to `string`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidParameter`] when the short part is longer than one character.
    pub fn parse(route: &str, long: &str, declaration: &str) -> Result<Self, ConfigError> {
        let (required, rest) = match declaration.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, declaration),
        };
        let (short, type_name) = rest.split_once(':').unwrap_or((rest, ""));
        let mut short_chars = short.chars();
        let short = match (short_chars.next(), short_chars.next()) {
            (None, _) => None,
            (Some(c), None) if c.is_ascii_alphanumeric() => Some(c),
            _ => {
                return Err(ConfigError::InvalidParameter {
                    route: route.to_string(),
                    parameter: long.to_string(),
                    reason: format!("short name \"{short}\" must be a single letter or digit"),
                })
            }
        };
        Ok(Self {
            long: long.to_string(),
            short,
            type_name: if type_name.is_empty() {
                "string".to_string()
            } else {
                type_name.to_string()
            },
            required,
        })
    }

    /// Raw value from parsed flags, the long name taking precedence over the short one.
    #[must_use]
    pub fn value_from<'a>(&self, parameters: &'a Map<String, Value>) -> Option<&'a Value> {
        parameters.get(&self.long).or_else(|| {
            self.short
                .and_then(|c| parameters.get(&c.to_string()))
        })
    }

    /// Validate the provided value and parse it with the declared type.
    ///
    /// Returns `Ok(None)` for an absent optional parameter.
    ///
    /// # Errors
    ///
    /// A [`UserError`] for a missing required parameter, a flag lacking its value, or a
    /// value rejected by the type.
    pub fn verify(
        &self,
        parameters: &Map<String, Value>,
        types: &DataTypeRegistry,
    ) -> Result<Option<Value>, UserError> {
        let Some(raw) = self.value_from(parameters) else {
            if self.required {
                return Err(UserError::new(format!(
                    "The parameter \"--{}\" is required",
                    self.long
                )));
            }
            return Ok(None);
        };
        let Some(data_type) = types.get(&self.type_name) else {
            return Err(UserError::new(format!(
                "The parameter \"--{}\" has unknown type \"{}\"",
                self.long, self.type_name
            )));
        };

        let text = match raw {
            Value::Bool(b) if data_type.is_falsable() => return Ok(Some(Value::Bool(*b))),
            Value::Bool(_) | Value::Null => {
                return Err(UserError::new(format!(
                    "The parameter \"--{}\" requires a value of type {}",
                    self.long, self.type_name
                )))
            }
            Value::String(s) => s.clone(),
            other => data_type.format(other),
        };
        if !data_type.validate(&text) {
            return Err(UserError::new(format!(
                "The value \"{}\" of parameter \"--{}\" is not a valid {}",
                text, self.long, self.type_name
            )));
        }
        Ok(Some(data_type.parse(&text)))
    }

    /// One-line usage fragment, e.g. `[--(not-)dry-run]` or `-c|--count="int"`.
    #[must_use]
    pub fn usage(&self, types: &DataTypeRegistry) -> String {
        let falsable = types.get(&self.type_name).is_some_and(|t| t.is_falsable());
        let mut usage = String::new();
        if let Some(short) = self.short {
            usage.push('-');
            usage.push(short);
            usage.push('|');
        }
        if falsable {
            usage.push_str("--(not-)");
            usage.push_str(&self.long);
        } else {
            usage.push_str("--");
            usage.push_str(&self.long);
            usage.push_str("=\"");
            usage.push_str(&self.type_name);
            usage.push('"');
        }
        if self.required {
            usage
        } else {
            format!("[{usage}]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_round_trip() {
        let t = BooleanType;
        assert_eq!(t.parse(&t.format(&json!(true))), json!(true));
        assert_eq!(t.parse(&t.format(&json!(false))), json!(false));
        assert_eq!(t.parse("yes"), json!(true));
        assert_eq!(t.parse("off"), json!(false));
        assert!(t.validate("1"));
        assert!(!t.validate("maybe"));
    }

    #[test]
    fn test_integer_parse() {
        let t = IntegerType;
        assert_eq!(t.parse("42"), json!(42));
        assert_eq!(t.parse(&t.format(&json!(42))), json!(42));
        assert!(!t.validate("4x"));
    }

    #[test]
    fn test_file_type_requires_readable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let t = FileType;
        assert!(t.validate(file.path().to_str().unwrap()));
        assert!(!t.validate("/definitely/not/here.txt"));
    }

    #[test]
    fn test_argument_declaration() {
        let arg = CliArgument::parse("task", "count", "+c:int").unwrap();
        assert!(arg.required);
        assert_eq!(arg.short, Some('c'));
        assert_eq!(arg.type_name, "int");

        let arg = CliArgument::parse("task", "name", "").unwrap();
        assert!(!arg.required);
        assert_eq!(arg.short, None);
        assert_eq!(arg.type_name, "string");

        assert!(CliArgument::parse("task", "x", "ab:int").is_err());
    }

    #[test]
    fn test_argument_verify() {
        let types = DataTypeRegistry::default();
        let count = CliArgument::parse("task", "count", "+c:int").unwrap();
        let mut params = Map::new();
        assert!(count.verify(&params, &types).is_err());

        params.insert("c".into(), json!("12"));
        assert_eq!(count.verify(&params, &types).unwrap(), Some(json!(12)));

        params.insert("count".into(), json!("twelve"));
        let err = count.verify(&params, &types).unwrap_err();
        assert!(err.message.contains("--count"));

        let dry = CliArgument::parse("task", "dry-run", ":bool").unwrap();
        params.insert("dry-run".into(), json!(false));
        assert_eq!(dry.verify(&params, &types).unwrap(), Some(json!(false)));
    }

    #[test]
    fn test_argument_usage() {
        let types = DataTypeRegistry::default();
        let dry = CliArgument::parse("task", "dry-run", ":bool").unwrap();
        assert_eq!(dry.usage(&types), "[--(not-)dry-run]");
        let count = CliArgument::parse("task", "count", "+c:int").unwrap();
        assert_eq!(count.usage(&types), "-c|--count=\"int\"");
    }
}
