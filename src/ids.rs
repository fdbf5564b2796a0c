//! Dispatch correlation ids.

use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Id of one dispatch, logged as `dispatch_id` and echoed in the `x-request-id` header.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct DispatchId(Ulid);

impl DispatchId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Continue the id a client or proxy sent, or start a new one.
    ///
    /// Blank and malformed header values are ignored.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for DispatchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}
