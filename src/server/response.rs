use crate::dispatcher::{Outcome, REQUEST_ID_HEADER};
use crate::response::BufferedTransport;
use std::io::Cursor;
use tracing::warn;

/// Reason phrase for the status codes the dispatcher produces.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Plain-text response for failures that happen outside a dispatch.
pub fn plain_response(status: u16, text: &str) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let mut response =
        tiny_http::Response::from_data(text.as_bytes().to_vec()).with_status_code(status);
    if let Ok(header) = tiny_http::Header::from_bytes("Content-Type", "text/plain; charset=utf-8") {
        response.add_header(header);
    }
    response
}

/// Wire response for what the dispatcher wrote to `transport`.
///
/// A fatal outcome sends the last-resort message as a plain 500. Otherwise stray output
/// precedes the body, and `Content-Length` is taken from the combined data rather than from
/// the response head, which only counts the body.
pub fn into_response(
    transport: BufferedTransport,
    outcome: Outcome,
) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let mut response = match (&transport.fallback, outcome.fatal) {
        (Some(message), true) => plain_response(500, message),
        _ => {
            let status = transport.status.unwrap_or(outcome.code);
            let mut response =
                tiny_http::Response::from_data(transport.output()).with_status_code(status);
            for (name, value) in &transport.headers {
                if name.eq_ignore_ascii_case("content-length") {
                    continue;
                }
                match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                    Ok(header) => response.add_header(header),
                    Err(()) => warn!(header = %name, "Response header dropped"),
                }
            }
            response
        }
    };
    let id = outcome.dispatch_id.to_string();
    if let Ok(header) = tiny_http::Header::from_bytes(REQUEST_ID_HEADER.as_bytes(), id.as_bytes()) {
        response.add_header(header);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DispatchId;
    use crate::response::Transport;

    #[test]
    fn test_fatal_outcome_sends_fallback_text() {
        let mut transport = BufferedTransport::new();
        transport.emit_fallback("no response");
        let outcome = Outcome {
            code: 500,
            fatal: true,
            dispatch_id: DispatchId::new(),
        };
        let response = into_response(transport, outcome);
        assert_eq!(response.status_code().0, 500);
        assert_eq!(response.data_length(), Some("no response".len()));
    }

    #[test]
    fn test_content_length_counts_stray_output() {
        let mut transport = BufferedTransport::new();
        transport.write_stray("STRAY-").unwrap();
        transport
            .send_head(200, &[("Content-Length".to_string(), "16".to_string())])
            .unwrap();
        transport.write_body(b"<p>full body</p>").unwrap();
        let outcome = Outcome {
            code: 200,
            fatal: false,
            dispatch_id: DispatchId::new(),
        };
        let response = into_response(transport, outcome);
        assert_eq!(response.data_length(), Some("STRAY-<p>full body</p>".len()));
    }

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(302), "Found");
        assert_eq!(status_reason(599), "");
    }
}
