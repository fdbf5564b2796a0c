use super::{
    ErrorContext, ErrorResponse, Response, ResponseHead, SendContext, SendError, Sendable,
    Transport,
};
use crate::error::{DispatchError, UserError};
use serde::Serialize;
use serde_json::{json, Value};

const CONTENT_TYPE: &str = "application/json";

/// Structured-data response.
///
/// Encoding failures are kept until send time and surface as [`SendError::Json`].
#[derive(Debug)]
pub struct JsonResponse {
    head: ResponseHead,
    data: Value,
    encode_error: Option<serde_json::Error>,
    pretty: bool,
    encoded: Vec<u8>,
}

impl JsonResponse {
    pub fn new(data: Value) -> Self {
        let mut head = ResponseHead::new(200);
        head.set_header("Content-Type", CONTENT_TYPE);
        Self {
            head,
            data,
            encode_error: None,
            pretty: false,
            encoded: Vec::new(),
        }
    }

    /// Response from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::new(value),
            Err(e) => {
                let mut response = Self::new(Value::Null);
                response.encode_error = Some(e);
                response
            }
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.head.code = code;
        self
    }

    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// `{code, description, other}` error body.
    fn error_body(status: u16, code: Value, description: &str, other: Option<Value>) -> Self {
        Self::new(json!({
            "code": code,
            "description": description,
            "other": other,
        }))
        .with_code(status)
    }
}

impl Sendable for JsonResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn prepare(&mut self, _ctx: &SendContext<'_>) -> Result<(), SendError> {
        if let Some(e) = self.encode_error.take() {
            return Err(SendError::Json(e));
        }
        self.encoded = if self.pretty {
            serde_json::to_vec_pretty(&self.data)?
        } else {
            serde_json::to_vec(&self.data)?
        };
        self.head
            .set_header("Content-Length", self.encoded.len().to_string());
        Ok(())
    }

    fn write_body(
        &mut self,
        transport: &mut dyn Transport,
        _ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        transport.write_body(&self.encoded)?;
        Ok(())
    }
}

impl ErrorResponse for JsonResponse {
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response {
        if let Some(user) = err.as_user_error() {
            return Self::error_body(
                user.status(),
                json!(err.kind()),
                &user.message,
                user.reports.clone(),
            )
            .into();
        }
        let other = ctx.debug.then(|| json!(format!("{err:?}")));
        let description = if ctx.debug {
            err.to_string()
        } else {
            "An internal error occurred.".to_string()
        };
        Self::error_body(err.status(), json!("exception"), &description, other).into()
    }

    fn from_user_error(err: &UserError, _ctx: &ErrorContext) -> Response {
        Self::error_body(err.status(), json!("user"), &err.message, err.reports.clone()).into()
    }
}
