use super::{
    escape_html, ErrorContext, ErrorResponse, RedirectResponse, Response, ResponseHead,
    SendContext, SendError, Sendable, Transport,
};
use crate::error::{DispatchError, UserError};
use serde_json::{json, Value};
use tracing::debug;

const CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug)]
enum HtmlBody {
    Raw(String),
    /// Rendered at send time
    Layout { layout: String, values: Value },
    /// First existing layout wins; `fallback` is used when none exists
    ErrorPage {
        layouts: Vec<String>,
        values: Value,
        fallback: String,
    },
}

#[derive(Debug)]
pub struct HtmlResponse {
    head: ResponseHead,
    body: HtmlBody,
    rendered: Vec<u8>,
}

impl HtmlResponse {
    /// Response with a ready body.
    pub fn new(body: impl Into<String>) -> Self {
        Self::with_body(200, HtmlBody::Raw(body.into()))
    }

    /// Response whose body is rendered from `layout` when it is sent.
    pub fn collect_from(layout: impl Into<String>, values: Value) -> Self {
        Self::with_body(
            200,
            HtmlBody::Layout {
                layout: layout.into(),
                values,
            },
        )
    }

    fn with_body(code: u16, body: HtmlBody) -> Self {
        let mut head = ResponseHead::new(code);
        head.set_header("Content-Type", CONTENT_TYPE);
        Self {
            head,
            body,
            rendered: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.head.code = code;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.head.set_header(name, value);
        self
    }

    /// Layout this response renders, if deferred.
    #[must_use]
    pub fn layout(&self) -> Option<&str> {
        match &self.body {
            HtmlBody::Layout { layout, .. } => Some(layout),
            _ => None,
        }
    }

    fn error_page(kind: &str, code: u16, message: &str, reports: Option<&Value>) -> Self {
        let layouts = error_layouts(kind, code);
        let fallback = format!(
            "<!DOCTYPE html>\n<html><head><title>Error {code}</title></head><body>\
             <h1>Error {code}</h1><p>{}</p><p>No error layout found (searched: {}).</p>\
             </body></html>",
            escape_html(message),
            escape_html(&layouts.join(", ")),
        );
        let values = json!({
            "code": code,
            "kind": kind,
            "message": message,
            "reports": reports,
        });
        Self::with_body(
            code,
            HtmlBody::ErrorPage {
                layouts,
                values,
                fallback,
            },
        )
    }

    fn diagnostic_page(err: &DispatchError) -> Self {
        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>System error</title></head><body>\
             <h1>System error ({})</h1><pre>{}</pre></body></html>",
            err.kind(),
            escape_html(&format!("{err:?}")),
        );
        Self::with_body(err.status(), HtmlBody::Raw(body))
    }
}

/// Error layouts tried for an error of `kind` and `code`, most specific first.
#[must_use]
pub fn error_layouts(kind: &str, code: u16) -> Vec<String> {
    vec![
        format!("error/error-{kind}-{code}"),
        format!("error/error-{kind}"),
        format!("error/error-{code}"),
        "error/error".to_string(),
    ]
}

impl Sendable for HtmlResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn prepare(&mut self, ctx: &SendContext<'_>) -> Result<(), SendError> {
        let html = match &self.body {
            HtmlBody::Raw(body) => body.clone(),
            HtmlBody::Layout { layout, values } => {
                ctx.renderer
                    .render(layout, values)
                    .map_err(|source| SendError::Render {
                        layout: layout.clone(),
                        source,
                    })?
            }
            HtmlBody::ErrorPage {
                layouts,
                values,
                fallback,
            } => match layouts.iter().find(|l| ctx.renderer.has_layout(l)) {
                Some(layout) => {
                    debug!(layout = %layout, "Rendering error layout");
                    ctx.renderer
                        .render(layout, values)
                        .map_err(|source| SendError::Render {
                            layout: layout.clone(),
                            source,
                        })?
                }
                None => fallback.clone(),
            },
        };
        self.rendered = html.into_bytes();
        self.head
            .set_header("Content-Length", self.rendered.len().to_string());
        Ok(())
    }

    fn write_body(
        &mut self,
        transport: &mut dyn Transport,
        _ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        transport.write_body(&self.rendered)?;
        Ok(())
    }
}

impl ErrorResponse for HtmlResponse {
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response {
        if let DispatchError::Forbidden(_) = err {
            if let (true, Some(home)) = (ctx.forbidden_to_home, &ctx.home_url) {
                return RedirectResponse::new(home.clone(), false).into();
            }
        }
        if let Some(user) = err.as_user_error() {
            return Self::error_page(err.kind(), user.status(), &user.message, user.reports.as_ref())
                .into();
        }
        if ctx.debug {
            return Self::diagnostic_page(err).into();
        }
        Self::error_page(err.kind(), err.status(), "An internal error occurred.", None).into()
    }

    fn from_user_error(err: &UserError, _ctx: &ErrorContext) -> Response {
        Self::error_page("user", err.status(), &err.message, err.reports.as_ref()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{BufferedTransport, LayoutRenderer};
    use crate::session::NullSession;

    struct OneLayout(&'static str);

    impl LayoutRenderer for OneLayout {
        fn has_layout(&self, layout: &str) -> bool {
            layout == self.0
        }

        fn render(&self, layout: &str, values: &Value) -> anyhow::Result<String> {
            Ok(format!("{layout}:{}", values["code"]))
        }
    }

    fn send(response: &mut Response, renderer: &dyn LayoutRenderer) -> BufferedTransport {
        let mut transport = BufferedTransport::new();
        let ctx = SendContext {
            renderer,
            session: &NullSession,
        };
        response.send(&mut transport, &ctx).unwrap();
        transport
    }

    #[test]
    fn test_error_layout_order() {
        assert_eq!(
            error_layouts("not-found", 404),
            vec![
                "error/error-not-found-404",
                "error/error-not-found",
                "error/error-404",
                "error/error"
            ]
        );
    }

    #[test]
    fn test_error_page_uses_first_existing_layout() {
        let err = DispatchError::not_found("/missing");
        let mut response = HtmlResponse::from_error(&err, &ErrorContext::default());
        let transport = send(&mut response, &OneLayout("error/error-404"));
        assert_eq!(transport.status, Some(404));
        assert_eq!(transport.body_text(), "error/error-404:404");
    }

    #[test]
    fn test_error_page_inline_fallback() {
        let err = DispatchError::System(anyhow::anyhow!("db down"));
        let mut response = HtmlResponse::from_error(&err, &ErrorContext::default());
        let transport = send(&mut response, &OneLayout("nothing"));
        let body = transport.body_text();
        assert_eq!(transport.status, Some(500));
        assert!(body.contains("error/error-system-500"));
        assert!(!body.contains("db down"));
    }

    #[test]
    fn test_debug_mode_shows_diagnostics() {
        let err = DispatchError::System(anyhow::anyhow!("db down"));
        let ctx = ErrorContext {
            debug: true,
            ..ErrorContext::default()
        };
        let mut response = HtmlResponse::from_error(&err, &ctx);
        let transport = send(&mut response, &OneLayout("nothing"));
        assert!(transport.body_text().contains("db down"));
    }

    #[test]
    fn test_forbidden_to_home_redirects() {
        let ctx = ErrorContext {
            forbidden_to_home: true,
            home_url: Some("https://example.com/".to_string()),
            ..ErrorContext::default()
        };
        let response = HtmlResponse::from_error(&DispatchError::forbidden("admin"), &ctx);
        assert_eq!(response.code(), 302);
        assert_eq!(response.header("Location"), Some("https://example.com/"));
    }

    #[test]
    fn test_collect_from_renders_at_send_time() {
        let mut response: Response =
            HtmlResponse::collect_from("error/error", json!({"code": 7})).into();
        assert!(response.header("Content-Length").is_none());
        let transport = send(&mut response, &OneLayout("error/error"));
        assert_eq!(transport.body_text(), "error/error:7");
        assert_eq!(response.header("Content-Length"), Some("13"));
    }
}
