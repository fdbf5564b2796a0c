use super::{
    ErrorContext, ErrorResponse, HtmlResponse, Response, ResponseHead, SendContext, SendError,
    Sendable, Transport,
};
use crate::error::{ConfigError, DispatchError, UserError};
use crate::pattern::PathValues;
use crate::route::UrlGenerator;

#[derive(Debug, Clone)]
pub struct RedirectResponse {
    head: ResponseHead,
    location: String,
}

impl RedirectResponse {
    /// 301 when `permanent`, 302 otherwise.
    pub fn new(location: impl Into<String>, permanent: bool) -> Self {
        let location = location.into();
        let mut head = ResponseHead::new(if permanent { 301 } else { 302 });
        head.set_header("Location", location.clone());
        Self { head, location }
    }

    /// Temporary redirect to a named route.
    pub fn to_route<V: PathValues + ?Sized>(
        urls: &UrlGenerator<'_>,
        name: &str,
        values: &V,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(urls.url(name, values)?, false))
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.head.code == 301
    }
}

impl Sendable for RedirectResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn prepare(&mut self, _ctx: &SendContext<'_>) -> Result<(), SendError> {
        self.head.set_header("Content-Length", "0");
        Ok(())
    }

    fn write_body(
        &mut self,
        _transport: &mut dyn Transport,
        _ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        Ok(())
    }
}

// A redirect cannot carry an error; errors fall back to HTML pages.
impl ErrorResponse for RedirectResponse {
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response {
        HtmlResponse::from_error(err, ctx)
    }

    fn from_user_error(err: &UserError, ctx: &ErrorContext) -> Response {
        HtmlResponse::from_user_error(err, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let temporary = RedirectResponse::new("/login", false);
        assert_eq!(temporary.head().code, 302);
        assert!(!temporary.is_permanent());

        let permanent = RedirectResponse::new("https://example.com/new", true);
        assert_eq!(permanent.head().code, 301);
        assert_eq!(permanent.head().header("location"), Some("https://example.com/new"));
    }
}
