use crate::request::HttpRequest;
use std::io::{self, Read};

/// Read a `tiny_http` request, body included, into an [`HttpRequest`].
///
/// Headers that `http` rejects are skipped.
///
/// # Errors
///
/// Failure to read the body, or a request target that is not a valid URI.
pub fn to_http_request(request: &mut tiny_http::Request) -> io::Result<HttpRequest> {
    let mut builder = http::Request::builder()
        .method(request.method().to_string().as_str())
        .uri(request.url());
    for header in request.headers() {
        let name = header.field.as_str().as_str();
        let value = header.value.as_str();
        if http::HeaderName::from_bytes(name.as_bytes()).is_ok()
            && http::HeaderValue::from_str(value).is_ok()
        {
            builder = builder.header(name, value);
        }
    }

    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body)?;
    let built = builder
        .body(body)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(HttpRequest::from_http(built))
}
