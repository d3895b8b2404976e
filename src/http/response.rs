use std::collections::HashMap;

use crate::proxy::body::UpstreamBody;

/// An HTTP status code.
///
/// Any three-digit code can be carried so that upstream statuses are relayed
/// untouched; the constants cover the codes the proxy produces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK
    pub const OK: StatusCode = StatusCode(200);
    /// 206 Partial Content
    pub const PARTIAL_CONTENT: StatusCode = StatusCode(206);
    /// 304 Not Modified
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    /// 400 Bad Request
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 405 Method Not Allowed
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    /// 416 Range Not Satisfiable
    pub const RANGE_NOT_SATISFIABLE: StatusCode = StatusCode(416);
    /// 502 Bad Gateway
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    /// 504 Gateway Timeout
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);

    /// Builds a status code from its numeric value.
    ///
    /// Returns `None` outside the `100..=999` range.
    ///
    /// # Example
    ///
    /// ```
    /// # use stremmer::http::response::StatusCode;
    /// assert_eq!(StatusCode::from_u16(206), Some(StatusCode::PARTIAL_CONTENT));
    /// assert_eq!(StatusCode::from_u16(42), None);
    /// ```
    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(StatusCode(code))
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use stremmer::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard reason phrase, or `""` for codes without one.
    ///
    /// # Example
    ///
    /// ```
    /// # use stremmer::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE.reason_phrase(), "Range Not Satisfiable");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            412 => "Precondition Failed",
            416 => "Range Not Satisfiable",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }

    /// Responses with these codes never carry a body.
    pub fn is_bodyless(&self) -> bool {
        (100..200).contains(&self.0) || self.0 == 204 || self.0 == 304
    }
}

/// Response payload.
#[derive(Debug)]
pub enum Body {
    /// Body held in memory (locally generated responses).
    Full(Vec<u8>),
    /// Body still sitting in an upstream connection, relayed on write.
    Upstream(UpstreamBody),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Vec::new())
    }

    /// In-memory bytes, `None` for streamed bodies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Full(bytes) => Some(bytes.as_slice()),
            Body::Upstream(_) => None,
        }
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Reason phrase written on the status line
    pub reason: String,
    /// Header names are stored lowercase. Values are raw bytes so that
    /// upstream obs-text survives the relay.
    pub headers: HashMap<String, Vec<u8>>,
    pub body: Body,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "text/plain")
///     .body(b"ok".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    reason: Option<String>,
    headers: HashMap<String, Vec<u8>>,
    body: Body,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: HashMap::new(),
            body: Body::empty(),
        }
    }

    /// Overrides the standard reason phrase.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Adds or replaces a header. Names are case-insensitive.
    pub fn header(mut self, key: impl AsRef<str>, value: impl Into<Vec<u8>>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets an in-memory body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Full(body);
        self
    }

    /// Sets a body streamed from upstream.
    pub fn stream(mut self, body: UpstreamBody) -> Self {
        self.body = Body::Upstream(body);
        self
    }

    /// Builds the final Response.
    ///
    /// In-memory bodies get a Content-Length header unless one is already set.
    pub fn build(mut self) -> Response {
        if let Body::Full(bytes) = &self.body {
            let len = bytes.len();
            self.headers
                .entry("content-length".to_string())
                .or_insert_with(|| len.to_string().into_bytes());
        }

        let reason = self
            .reason
            .unwrap_or_else(|| self.status.reason_phrase().to_string());

        Response {
            status: self.status,
            reason,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a plain-text response.
    pub fn text(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body.into())
            .build()
    }

    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::text(StatusCode::OK, body)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::text(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "not found")
    }

    pub fn method_not_allowed(allow: &str) -> Self {
        ResponseBuilder::new(StatusCode::METHOD_NOT_ALLOWED)
            .header("Allow", allow)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(b"method not allowed".to_vec())
            .build()
    }

    /// Case-insensitive header lookup. Values that are not UTF-8 read as
    /// absent; see [`Response::header_bytes`].
    pub fn header(&self, key: &str) -> Option<&str> {
        self.header_bytes(key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn header_bytes(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_slice())
    }
}
