use super::locale::{parse_accept_language, LocaleRouting};
use super::RouteBinding;
use crate::pattern::normalize_path;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, HOST};
use http::Method;
use once_cell::unsync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// How the request body was decoded into [`HttpRequest::input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    None,
    Json,
    Form,
    /// `multipart/form-data`; fields and files are supplied by the host
    Multipart,
    Raw,
}

/// Descriptor of an uploaded file, stored by the host before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub temp_path: std::path::PathBuf,
}

/// An inbound HTTP call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    raw_path: String,
    scheme: String,
    domain: String,
    query: Map<String, Value>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    files: Vec<UploadedFile>,
    input: Value,
    input_type: InputType,
    pub(super) binding: OnceCell<RouteBinding>,
}

impl HttpRequest {
    /// Request for `target` (path plus optional query string).
    pub fn new(method: Method, target: &str) -> Self {
        let (raw_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Map::new()),
        };
        Self {
            method,
            path: normalize_path(raw_path),
            raw_path: raw_path.to_string(),
            scheme: "http".to_string(),
            domain: "localhost".to_string(),
            query,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            files: Vec::new(),
            input: Value::Null,
            input_type: InputType::None,
            binding: OnceCell::new(),
        }
    }

    /// Assemble a request from a transport-level `http::Request`.
    ///
    /// The body is decoded from JSON when the content type says so, form-decoded when it is
    /// URL-encoded (or absent), and kept as text otherwise.
    pub fn from_http(request: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = request.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());
        let mut built = Self::new(parts.method, &target);

        if let Some(scheme) = parts.uri.scheme_str() {
            built.scheme = scheme.to_string();
        }
        let host = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            });
        if let Some(host) = host {
            built.domain = host;
        }
        built.cookies = parse_cookies(&parts.headers);
        built.headers = parts.headers;

        if !body.is_empty() {
            let content_type = built.header(CONTENT_TYPE.as_str()).unwrap_or_default().to_string();
            let (input_type, input) = parse_body(&content_type, &body);
            built.input_type = input_type;
            built.input = input;
        }
        built
    }

    /// Add a header; invalid names or values are dropped with a warning.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                if name == COOKIE {
                    if let Ok(text) = value.to_str() {
                        self.cookies.extend(parse_cookie_header(text));
                    }
                }
                self.headers.append(name, value);
            }
            _ => warn!(header = %name, "Invalid header dropped"),
        }
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_json(mut self, input: Value) -> Self {
        self.input = input;
        self.input_type = InputType::Json;
        self
    }

    /// Use a URL-encoded form body as input.
    #[must_use]
    pub fn with_form(mut self, body: &str) -> Self {
        self.input = Value::Object(parse_query(body));
        self.input_type = InputType::Form;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Normalized path: percent-decoded, without query or trailing slash.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path as received, before decoding.
    #[must_use]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.query.get(name)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name` (case-insensitive), when it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Cookie by name; the last occurrence wins.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    #[must_use]
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    #[must_use]
    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    /// Field of an object body.
    #[must_use]
    pub fn input_value(&self, name: &str) -> Option<&Value> {
        self.input.as_object().and_then(|o| o.get(name))
    }

    /// Body field, falling back to the query string.
    #[must_use]
    pub fn data(&self, name: &str) -> Option<&Value> {
        self.input_value(name).or_else(|| self.query.get(name))
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    #[must_use]
    pub fn is_put(&self) -> bool {
        self.method == Method::PUT
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.method == Method::DELETE
    }

    /// Absolute URL of this request, query included.
    #[must_use]
    pub fn url(&self) -> String {
        let mut url = format!("{}://{}{}", self.scheme, self.domain, self.raw_path);
        if !self.query.is_empty() {
            url.push('?');
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in &self.query {
                match value {
                    Value::String(s) => {
                        serializer.append_pair(key, s);
                    }
                    Value::Array(items) => {
                        let key = format!("{key}[]");
                        for item in items {
                            serializer.append_pair(&key, item.as_str().unwrap_or_default());
                        }
                    }
                    other => {
                        serializer.append_pair(key, &other.to_string());
                    }
                }
            }
            url.push_str(&serializer.finish());
        }
        url
    }

    /// Preferred locales from `Accept-Language`, best first.
    #[must_use]
    pub fn accepted_locales(&self) -> Vec<String> {
        self.header("accept-language")
            .map(parse_accept_language)
            .unwrap_or_default()
    }

    /// Locale selected by `routing` for this request.
    #[must_use]
    pub fn locale(&self, routing: &LocaleRouting) -> String {
        routing.resolve(self)
    }
}

/// Decode a URL-encoded string into a map.
///
/// `key[]` entries collect into an array under `key`; other repeated keys keep the last value.
#[must_use]
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if let Some(base) = key.strip_suffix("[]") {
            let entry = map
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value.into_owned())),
                other => *other = Value::Array(vec![Value::String(value.into_owned())]),
            }
        } else {
            map.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    map
}

/// Cookies from every `Cookie` header.
#[must_use]
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(parse_cookie_header)
        .collect()
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            let value = urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned());
            Some((name.to_string(), value))
        })
        .collect()
}

fn parse_body(content_type: &str, body: &[u8]) -> (InputType, Value) {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        return match serde_json::from_slice(body) {
            Ok(value) => (InputType::Json, value),
            Err(e) => {
                warn!(error = %e, "Invalid JSON request body ignored");
                (InputType::Json, Value::Null)
            }
        };
    }
    match mime.as_str() {
        "" | "application/x-www-form-urlencoded" => {
            let text = String::from_utf8_lossy(body);
            (InputType::Form, Value::Object(parse_query(&text)))
        }
        "multipart/form-data" => (InputType::Multipart, Value::Null),
        _ => (
            InputType::Raw,
            Value::String(String::from_utf8_lossy(body).into_owned()),
        ),
    }
}
