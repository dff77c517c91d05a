//! Framework-neutral request view consumed by the binding pipeline.

use std::fmt;
use std::io::{Cursor, Read};

/// Body stream of a [`BindRequest`]. It is read at most once.
pub type BodyReader = Box<dyn Read + Send>;

/// An incoming request reduced to what parameter binding needs.
///
/// Framework integrations build one of these from their native request type:
/// the method, headers in arrival order (repeats allowed), the raw query
/// string and a one-shot body stream.
///
/// # Examples
///
/// ```
/// use param_bind::BindRequest;
///
/// let req = BindRequest::new("req-7")
///     .with_method("POST")
///     .with_header("Content-Type", "application/json")
///     .with_query("page=2")
///     .with_body(r#"{"name":"k"}"#);
///
/// assert_eq!(req.method(), "POST");
/// assert_eq!(req.content_type(), Some("application/json"));
/// assert_eq!(req.request_id(), "req-7");
/// ```
pub struct BindRequest {
    request_id: String,
    method: String,
    headers: Vec<(String, String)>,
    query: String,
    body: Option<BodyReader>,
}

impl BindRequest {
    /// Creates an empty `GET` request with the given request id.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            query: String::new(),
            body: None,
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Appends a header; repeated names are kept in order.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Appends a header in place.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Sets the raw query string, without the leading `?`.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets an in-memory body.
    #[must_use]
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_reader(Cursor::new(body.into()))
    }

    /// Sets a streaming body.
    #[must_use]
    pub fn with_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Some(Box::new(reader));
        self
    }

    /// Request identifier used to correlate log events.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Headers in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Raw query string.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Value of the first `Content-Type` header, matched case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Lowercased media type of the content type, without parameters.
    pub(crate) fn media_type(&self) -> Option<String> {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
    }

    /// Whether the body stream has not been taken yet.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Takes the body stream, leaving the request without one.
    pub(crate) fn take_body(&mut self) -> Option<BodyReader> {
        self.body.take()
    }
}

impl fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRequest")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("headers", &self.headers.len())
            .field("query_len", &self.query.len())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
