//! # Path Pattern Module
//!
//! Compiles route path templates into anchored regular expressions and formats them back
//! into concrete paths.
//!
//! ## Template grammar
//!
//! A template is literal text with `{...}` placeholders:
//!
//! - `{name}` binds `name` to one or more non-slash characters
//! - `{regex:name}` binds `name` to the given regular expression fragment
//! - `{alias:name}` binds `name` to a registered [`TypeAliases`] entry (`int`, `id`, `slug`)
//!
//! Literal text is escaped before it reaches the regex engine, so `/feed.xml` only matches a
//! literal dot. Compiled matchers are anchored at both ends and match case-insensitively.
//!
//! ```rust
//! use brrtdispatch::pattern::{PathPattern, TypeAliases};
//!
//! let pattern = PathPattern::compile("/users/{int:id}", &TypeAliases::default()).unwrap();
//! let values = pattern.match_path("/users/42").unwrap();
//! assert_eq!(values[0].1, "42");
//! assert_eq!(pattern.format(&[("id", "42")]).unwrap(), "/users/42");
//! ```

mod core;

pub use self::core::{
    compile, extract_variable, normalize_command_path, normalize_path, reverse_format, ParamVec,
    PathPattern, PathValues, PatternError, TypeAliases, DEFAULT_VALUE_PATTERN, MAX_INLINE_PARAMS,
};
