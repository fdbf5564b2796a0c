//! # Response Module
//!
//! Outbound responses and the transports they are serialized to.
//!
//! A [`Response`] is one of five variants (HTML, JSON, redirect, file stream, CLI text).
//! Each variant implements [`Sendable`]; [`Response::send`] drives the shared contract:
//!
//! 1. `prepare`: generate deferred content (layouts are rendered here, not when the
//!    controller returns) and finalize headers
//! 2. the head (status or exit code, headers) is written to the [`Transport`]
//! 3. `write_body`: the body is streamed
//!
//! A response can be sent once. The second attempt fails with [`SendError::AlreadySent`].
//!
//! Every variant also implements [`ErrorResponse`], so any error boundary can build a
//! response from a [`DispatchError`] or a [`UserError`] knowing only the route's
//! [`OutputFormat`].

mod console;
mod file;
mod html;
mod json;
mod redirect;
mod render;
mod transport;

pub use console::{CliResponse, CLI_ERROR_CODE};
pub use file::{content_type_for, Disposition, FileResponse, DEFAULT_MAX_AGE};
pub use html::{error_layouts, HtmlResponse};
pub use json::JsonResponse;
pub use redirect::RedirectResponse;
pub use render::{LayoutRenderer, NullRenderer, TemplateRenderer};
pub use transport::{BufferedTransport, StdioTransport, Transport};

use crate::error::{DispatchError, UserError};
use crate::route::OutputFormat;
use crate::session::SessionStore;
use thiserror::Error;

/// Failure while serializing a response to its transport.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot render layout \"{layout}\": {source}")]
    Render {
        layout: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("response was already sent")]
    AlreadySent,
}

/// Collaborators available while a response is serialized.
#[derive(Clone, Copy)]
pub struct SendContext<'a> {
    pub renderer: &'a dyn LayoutRenderer,
    pub session: &'a dyn SessionStore,
}

/// Settings that shape error responses.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Include diagnostics for system errors
    pub debug: bool,
    /// Redirect forbidden HTML requests to `home_url`
    pub forbidden_to_home: bool,
    pub home_url: Option<String>,
}

/// Status, headers and auxiliary data shared by every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub code: u16,
    pub headers: Vec<(String, String)>,
    /// Text a capturing controller printed while it ran
    pub controller_output: Option<String>,
    sent: bool,
}

impl ResponseHead {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            headers: Vec::new(),
            controller_output: None,
            sent: false,
        }
    }

    /// Set a header, replacing any previous value (names compare case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }
}

/// Serialization contract implemented by every response variant.
pub trait Sendable {
    fn head(&self) -> &ResponseHead;

    fn head_mut(&mut self) -> &mut ResponseHead;

    /// Generate deferred content and finalize headers. Runs before the head is written.
    fn prepare(&mut self, _ctx: &SendContext<'_>) -> Result<(), SendError> {
        Ok(())
    }

    fn write_body(
        &mut self,
        transport: &mut dyn Transport,
        ctx: &SendContext<'_>,
    ) -> Result<(), SendError>;
}

/// Constructors used by error boundaries that do not know the concrete controller.
pub trait ErrorResponse {
    /// Response for any dispatch error.
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response;

    /// Response for an expected user error.
    fn from_user_error(err: &UserError, ctx: &ErrorContext) -> Response;
}

#[derive(Debug)]
pub enum Response {
    Html(HtmlResponse),
    Json(JsonResponse),
    Redirect(RedirectResponse),
    File(FileResponse),
    Cli(CliResponse),
}

impl Response {
    /// Error response in the family of `format`.
    #[must_use]
    pub fn from_error(format: OutputFormat, err: &DispatchError, ctx: &ErrorContext) -> Self {
        match format {
            OutputFormat::Html => HtmlResponse::from_error(err, ctx),
            OutputFormat::Json => JsonResponse::from_error(err, ctx),
            OutputFormat::Cli => CliResponse::from_error(err, ctx),
        }
    }

    #[must_use]
    pub fn from_user_error(format: OutputFormat, err: &UserError, ctx: &ErrorContext) -> Self {
        match format {
            OutputFormat::Html => HtmlResponse::from_user_error(err, ctx),
            OutputFormat::Json => JsonResponse::from_user_error(err, ctx),
            OutputFormat::Cli => CliResponse::from_user_error(err, ctx),
        }
    }

    fn sendable(&self) -> &dyn Sendable {
        match self {
            Response::Html(r) => r,
            Response::Json(r) => r,
            Response::Redirect(r) => r,
            Response::File(r) => r,
            Response::Cli(r) => r,
        }
    }

    fn sendable_mut(&mut self) -> &mut dyn Sendable {
        match self {
            Response::Html(r) => r,
            Response::Json(r) => r,
            Response::Redirect(r) => r,
            Response::File(r) => r,
            Response::Cli(r) => r,
        }
    }

    #[must_use]
    pub fn head(&self) -> &ResponseHead {
        self.sendable().head()
    }

    pub fn head_mut(&mut self) -> &mut ResponseHead {
        self.sendable_mut().head_mut()
    }

    /// HTTP status, or process exit code for CLI responses.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.head().code
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head().header(name)
    }

    #[must_use]
    pub fn controller_output(&self) -> Option<&str> {
        self.head().controller_output.as_deref()
    }

    pub fn set_controller_output(&mut self, output: String) {
        self.head_mut().controller_output = Some(output);
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.head().sent
    }

    /// Short variant label for logs.
    #[must_use]
    pub fn variant(&self) -> &'static str {
        match self {
            Response::Html(_) => "html",
            Response::Json(_) => "json",
            Response::Redirect(_) => "redirect",
            Response::File(_) => "file",
            Response::Cli(_) => "cli",
        }
    }

    /// Serialize to `transport`: prepare, head, body, finish.
    ///
    /// The response is marked sent as soon as this starts, so a failed send is not retried
    /// with the same instance.
    pub fn send(
        &mut self,
        transport: &mut dyn Transport,
        ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        if self.is_sent() {
            return Err(SendError::AlreadySent);
        }
        let sendable = self.sendable_mut();
        sendable.head_mut().sent = true;
        sendable.prepare(ctx)?;
        let head = sendable.head();
        transport.send_head(head.code, &head.headers)?;
        sendable.write_body(transport, ctx)?;
        transport.finish()?;
        Ok(())
    }
}

impl From<HtmlResponse> for Response {
    fn from(r: HtmlResponse) -> Self {
        Response::Html(r)
    }
}

impl From<JsonResponse> for Response {
    fn from(r: JsonResponse) -> Self {
        Response::Json(r)
    }
}

impl From<RedirectResponse> for Response {
    fn from(r: RedirectResponse) -> Self {
        Response::Redirect(r)
    }
}

impl From<FileResponse> for Response {
    fn from(r: FileResponse) -> Self {
        Response::File(r)
    }
}

impl From<CliResponse> for Response {
    fn from(r: CliResponse) -> Self {
        Response::Cli(r)
    }
}

/// Escape text for inclusion in HTML.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
