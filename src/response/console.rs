use super::{
    ErrorContext, ErrorResponse, Response, ResponseHead, SendContext, SendError, Sendable,
    Transport,
};
use crate::error::{DispatchError, UserError};

/// Exit code of every CLI error response.
pub const CLI_ERROR_CODE: u16 = 1;

/// Console output; `code` is the process exit code.
#[derive(Debug, Clone)]
pub struct CliResponse {
    head: ResponseHead,
    body: String,
}

impl CliResponse {
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        let mut head = ResponseHead::new(code);
        head.set_header("Content-Type", "text/plain; charset=utf-8");
        Self {
            head,
            body: body.into(),
        }
    }

    /// Successful output, exit code 0.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(0, body)
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    fn error_text(message: &str, reports: Option<&serde_json::Value>) -> String {
        let mut text = format!("Error: {message}\n");
        if let Some(reports) = reports {
            if let Ok(pretty) = serde_json::to_string_pretty(reports) {
                text.push_str(&pretty);
                text.push('\n');
            }
        }
        text
    }
}

impl Sendable for CliResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn write_body(
        &mut self,
        transport: &mut dyn Transport,
        _ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        transport.write_body(self.body.as_bytes())?;
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            transport.write_body(b"\n")?;
        }
        Ok(())
    }
}

impl ErrorResponse for CliResponse {
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response {
        if let Some(user) = err.as_user_error() {
            return Self::new(CLI_ERROR_CODE, Self::error_text(&user.message, user.reports.as_ref()))
                .into();
        }
        let text = if ctx.debug {
            format!("System error: {err:?}\n")
        } else {
            "Error: an internal error occurred.\n".to_string()
        };
        Self::new(CLI_ERROR_CODE, text).into()
    }

    fn from_user_error(err: &UserError, _ctx: &ErrorContext) -> Response {
        Self::new(CLI_ERROR_CODE, Self::error_text(&err.message, err.reports.as_ref())).into()
    }
}
