use regex::Regex;
use serde_json::Value;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of bound path values before heap allocation.
/// Most routes have ≤4 placeholders (e.g. `/users/{int:id}/posts/{slug:post}`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Value pattern used by `{name}` placeholders: any run of non-slash characters.
pub const DEFAULT_VALUE_PATTERN: &str = r"[^/]+";

/// Bound path values in placeholder order.
///
/// Names are `Arc<str>` shared with the compiled pattern; values are per-request data.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Errors raised while compiling or formatting a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unbalanced '{{' at byte {position} in path \"{template}\"")]
    Unbalanced { template: String, position: usize },

    #[error("unexpected '}}' at byte {position} in path \"{template}\"")]
    UnexpectedClose { template: String, position: usize },

    #[error("invalid variable name in placeholder \"{{{placeholder}}}\"")]
    InvalidName { placeholder: String },

    #[error("variable \"{variable}\" appears twice in path \"{template}\"")]
    DuplicateVariable { template: String, variable: String },

    #[error("invalid regular expression for path \"{template}\": {message}")]
    InvalidRegex { template: String, message: String },

    #[error(
        "path \"{template}\" declares {variables} variable(s) but its expression captures {captures} group(s)"
    )]
    CaptureMismatch {
        template: String,
        variables: usize,
        captures: usize,
    },

    #[error("the variable \"{variable}\" is missing to generate the path")]
    MissingVariable { variable: String },

    #[error("the value \"{value}\" of variable \"{variable}\" does not match \"{pattern}\"")]
    InvalidValue {
        variable: String,
        value: String,
        pattern: String,
    },
}

/// Registry of named value patterns usable as `{alias:name}`.
#[derive(Debug, Clone)]
pub struct TypeAliases {
    aliases: HashMap<String, String>,
}

impl Default for TypeAliases {
    fn default() -> Self {
        let mut aliases = Self::empty();
        aliases.register("int", r"\d+");
        aliases.register("id", r"[1-9]\d*");
        aliases.register("slug", r"[a-z0-9\-_]+");
        aliases
    }
}

impl TypeAliases {
    /// Alias table with no entries; every fragment is taken as a literal expression.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Register (or replace) an alias.
    pub fn register(&mut self, alias: impl Into<String>, pattern: impl Into<String>) {
        self.aliases.insert(alias.into(), pattern.into());
    }

    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }
}

/// Source of values for reverse formatting.
///
/// Slices of pairs resolve duplicates with "last write wins".
pub trait PathValues {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl<K: AsRef<str>, V: AsRef<str>> PathValues for [(K, V)] {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .rev()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| Cow::Borrowed(v.as_ref()))
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> PathValues for [(K, V); N] {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self[..].path_value(name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> PathValues for Vec<(K, V)> {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self[..].path_value(name)
    }
}

impl PathValues for ParamVec {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self[..].path_value(name)
    }
}

impl<S: BuildHasher> PathValues for HashMap<String, String, S> {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl PathValues for BTreeMap<String, String> {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl PathValues for serde_json::Map<String, Value> {
    fn path_value(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get(name)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Placeholder {
    name: Arc<str>,
    pattern: String,
    validator: Regex,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Variable(usize),
}

enum Token<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// A compiled path template.
///
/// Compilation is deterministic: compiling the same template with the same aliases always
/// yields an identical matcher and variable list.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    segments: Vec<Segment>,
    placeholders: Vec<Placeholder>,
    variables: Vec<Arc<str>>,
}

impl PathPattern {
    /// Compile `template`, resolving `{alias:name}` fragments through `aliases`.
    ///
    /// # Errors
    ///
    /// Fails on unbalanced braces, invalid or duplicate names, invalid expressions, and
    /// fragments that add capture groups of their own (which would break positional binding).
    pub fn compile(template: &str, aliases: &TypeAliases) -> Result<Self, PatternError> {
        let template = trim_trailing_slash(template);
        let tokens = tokenize(template)?;

        let mut source = String::with_capacity(template.len() + 16);
        source.push_str("(?i)^");
        let mut segments = Vec::with_capacity(tokens.len());
        let mut placeholders: Vec<Placeholder> = Vec::new();

        for token in tokens {
            match token {
                Token::Literal(text) => {
                    source.push_str(&regex::escape(text));
                    segments.push(Segment::Literal(text.to_string()));
                }
                Token::Placeholder(body) => {
                    let (name, pattern) = extract_variable(body, aliases)?;
                    if placeholders.iter().any(|p| *p.name == *name) {
                        return Err(PatternError::DuplicateVariable {
                            template: template.to_string(),
                            variable: name,
                        });
                    }
                    let validator = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                        PatternError::InvalidRegex {
                            template: template.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    source.push('(');
                    source.push_str(&pattern);
                    source.push(')');
                    segments.push(Segment::Variable(placeholders.len()));
                    placeholders.push(Placeholder {
                        name: Arc::from(name),
                        pattern,
                        validator,
                    });
                }
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| PatternError::InvalidRegex {
            template: template.to_string(),
            message: e.to_string(),
        })?;

        // Group 0 is the whole match
        let captures = regex.captures_len() - 1;
        if captures != placeholders.len() {
            return Err(PatternError::CaptureMismatch {
                template: template.to_string(),
                variables: placeholders.len(),
                captures,
            });
        }

        let variables = placeholders.iter().map(|p| Arc::clone(&p.name)).collect();
        Ok(Self {
            template: template.to_string(),
            regex,
            segments,
            placeholders,
            variables,
        })
    }

    /// The (trailing-slash normalized) template this pattern was compiled from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Variable names in capture order.
    #[must_use]
    pub fn variables(&self) -> &[Arc<str>] {
        &self.variables
    }

    /// Value pattern of a variable, after alias resolution.
    #[must_use]
    pub fn value_pattern(&self, variable: &str) -> Option<&str> {
        self.placeholders
            .iter()
            .find(|p| &*p.name == variable)
            .map(|p| p.pattern.as_str())
    }

    /// Match an already normalized path, binding values by capture position.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<ParamVec> {
        let captures = self.regex.captures(path)?;
        let mut values = ParamVec::new();
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1).map_or("", |m| m.as_str());
            values.push((Arc::clone(name), value.to_string()));
        }
        Some(values)
    }

    /// Substitute `values` into the template.
    ///
    /// Every value is checked against its placeholder's pattern (anchored, case-sensitive)
    /// so the produced path is always accepted by [`PathPattern::match_path`].
    ///
    /// # Errors
    ///
    /// [`PatternError::MissingVariable`] or [`PatternError::InvalidValue`], naming the variable.
    pub fn format<V: PathValues + ?Sized>(&self, values: &V) -> Result<String, PatternError> {
        self.render(values, false)
    }

    /// Like [`PathPattern::format`] but percent-encodes each substituted value.
    ///
    /// # Errors
    ///
    /// Same as [`PathPattern::format`].
    pub fn format_encoded<V: PathValues + ?Sized>(
        &self,
        values: &V,
    ) -> Result<String, PatternError> {
        self.render(values, true)
    }

    fn render<V: PathValues + ?Sized>(
        &self,
        values: &V,
        encode: bool,
    ) -> Result<String, PatternError> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(index) => {
                    let placeholder = &self.placeholders[*index];
                    let value = values.path_value(&placeholder.name).ok_or_else(|| {
                        PatternError::MissingVariable {
                            variable: placeholder.name.to_string(),
                        }
                    })?;
                    if !placeholder.validator.is_match(&value) {
                        return Err(PatternError::InvalidValue {
                            variable: placeholder.name.to_string(),
                            value: value.into_owned(),
                            pattern: placeholder.pattern.clone(),
                        });
                    }
                    if encode {
                        out.push_str(&urlencoding::encode(&value));
                    } else {
                        out.push_str(&value);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Compile `template` into its anchored matcher and ordered variable names.
///
/// # Errors
///
/// See [`PathPattern::compile`].
pub fn compile(
    template: &str,
    aliases: &TypeAliases,
) -> Result<(Regex, Vec<Arc<str>>), PatternError> {
    let pattern = PathPattern::compile(template, aliases)?;
    Ok((pattern.regex, pattern.variables))
}

/// Split a placeholder body into `(variable_name, value_pattern)`.
///
/// The name follows the last `:`, so expression fragments may contain colons themselves
/// (`{(?:en|fr):lang}`). A purely alphabetic fragment naming a registered alias is replaced by
/// the alias pattern; anything else is used verbatim.
///
/// # Errors
///
/// [`PatternError::InvalidName`] when the name is empty or contains characters other than
/// ASCII alphanumerics, `_` and `-`.
pub fn extract_variable(
    body: &str,
    aliases: &TypeAliases,
) -> Result<(String, String), PatternError> {
    let (fragment, name) = match body.rfind(':') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => ("", body),
    };
    let name = name.trim();
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_name {
        return Err(PatternError::InvalidName {
            placeholder: body.to_string(),
        });
    }

    let pattern = if fragment.is_empty() {
        DEFAULT_VALUE_PATTERN.to_string()
    } else if fragment.chars().all(|c| c.is_ascii_alphabetic()) {
        aliases
            .get(fragment)
            .map_or_else(|| fragment.to_string(), str::to_string)
    } else {
        fragment.to_string()
    };
    Ok((name.to_string(), pattern))
}

/// Compile `template` and substitute `values` into it.
///
/// # Errors
///
/// Compilation errors, or a missing/invalid value naming the offending variable.
pub fn reverse_format<V: PathValues + ?Sized>(
    template: &str,
    values: &V,
    aliases: &TypeAliases,
) -> Result<String, PatternError> {
    PathPattern::compile(template, aliases)?.format(values)
}

/// Normalize an inbound request path before matching.
///
/// Drops the query string and fragment, strips one trailing slash (the root path `/` is
/// kept) and percent-decodes the remainder. The slash is stripped while the path is still
/// encoded, so an encoded `%2F` ending a value survives. Templates get the same
/// trailing-slash rule at compile time. Undecodable input is matched raw.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = trim_trailing_slash(path);
    if trimmed.is_empty() {
        return "/".to_string();
    }
    urlencoding::decode(trimmed)
        .unwrap_or(Cow::Borrowed(trimmed))
        .into_owned()
}

/// Normalize a command-line route path: one trailing slash is stripped, nothing is decoded.
#[must_use]
pub fn normalize_command_path(path: &str) -> String {
    trim_trailing_slash(path.trim()).to_string()
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn tokenize(template: &str) -> Result<Vec<Token<'_>>, PatternError> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut chars = template.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' => {
                if i > literal_start {
                    tokens.push(Token::Literal(&template[literal_start..i]));
                }
                let mut depth = 1usize;
                let mut end = None;
                while let Some((j, c)) = chars.next() {
                    match c {
                        // Escaped characters never open or close a placeholder
                        '\\' => {
                            chars.next();
                        }
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(j);
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| PatternError::Unbalanced {
                    template: template.to_string(),
                    position: i,
                })?;
                tokens.push(Token::Placeholder(&template[i + 1..end]));
                literal_start = end + 1;
            }
            '}' => {
                return Err(PatternError::UnexpectedClose {
                    template: template.to_string(),
                    position: i,
                })
            }
            _ => {}
        }
    }
    if literal_start < template.len() {
        tokens.push(Token::Literal(&template[literal_start..]));
    }
    Ok(tokens)
}
