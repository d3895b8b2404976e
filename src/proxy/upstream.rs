//! Upstream request forwarding
//!
//! This module opens a fresh connection to object storage for every proxied
//! request, forwards the client's range headers, reads the response head and
//! hands the still-unread body back for streaming.

use crate::config::{Config, UpstreamConfig};
use crate::http::parser::{find_headers_end, has_control_bytes};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::body::{Framing, UpstreamBody};
use crate::proxy::error::UpstreamError;
use crate::proxy::headers::filter_headers;
use crate::proxy::rewrite::RewriteRule;
use anyhow::Result;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

/// Initial read buffer for the upstream response head
const BUFFER_SIZE: usize = 8192;

/// Upper bound on an upstream response head
pub const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// The parts of a client request the proxy acts on.
///
/// Everything else the client sent (cookies, authorization, user agent...)
/// is not carried over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Value of the `url` query parameter
    pub target_url: Option<String>,
    pub range: Option<String>,
    pub if_range: Option<String>,
    /// GET, or HEAD when the client only wants the headers
    pub method: Method,
}

impl ProxyRequest {
    pub fn get(target_url: impl Into<String>) -> Self {
        Self {
            target_url: Some(target_url.into()),
            range: None,
            if_range: None,
            method: Method::GET,
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self {
            target_url: request.query_param("url"),
            range: request.header("Range").map(str::to_string),
            if_range: request.header("If-Range").map(str::to_string),
            method: match request.method {
                Method::HEAD => Method::HEAD,
                _ => Method::GET,
            },
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Status line and headers of an upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamHead {
    pub status: StatusCode,
    /// Reason phrase as sent (may be empty). Non-UTF-8 bytes are replaced.
    pub reason: String,
    /// Values are kept as raw bytes; obs-text is legal in a response head.
    pub headers: Vec<(String, Vec<u8>)>,
}

impl UpstreamHead {
    /// First value of `key` as text, `None` if absent or not UTF-8.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
    }

    /// Works out how the body that follows this head is delimited.
    pub fn framing(&self, method: Method) -> Result<Framing, UpstreamError> {
        if method == Method::HEAD || self.status.is_bodyless() {
            return Ok(Framing::Empty);
        }

        if let Some(te) = self.header("Transfer-Encoding") {
            let last = te.rsplit(',').next().unwrap_or("").trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(Framing::Chunked);
            }
            return Ok(Framing::UntilClose);
        }

        match self.header("Content-Length") {
            Some(len) => len
                .trim()
                .parse::<u64>()
                .map(Framing::Length)
                .map_err(|_| {
                    UpstreamError::MalformedResponse(format!("invalid content-length {:?}", len))
                }),
            None => Ok(Framing::UntilClose),
        }
    }
}

/// Forwards proxy requests to object storage
pub struct ProxyHandler {
    rule: RewriteRule,

    /// Connection timeout duration
    connect_timeout: Duration,

    /// Time allowed for the complete response head
    response_timeout: Duration,

    /// Longest gap between body reads
    idle_timeout: Duration,
}

impl ProxyHandler {
    pub fn new(rule: RewriteRule, upstream: &UpstreamConfig) -> Self {
        Self {
            rule,
            connect_timeout: upstream.connect_timeout(),
            response_timeout: upstream.response_timeout(),
            idle_timeout: upstream.idle_timeout(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(cfg.storage.rewrite_rule()?, &cfg.upstream))
    }

    pub fn rule(&self) -> &RewriteRule {
        &self.rule
    }

    /// Serves one proxy request.
    ///
    /// Never fails: client mistakes become 400s, upstream transport failures
    /// become 502/504, and anything upstream answered is relayed as-is.
    pub async fn forward(&self, request: &ProxyRequest) -> Response {
        let Some(raw) = request.target_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::debug!("Rejected proxy request without url");
            return Response::bad_request("missing url");
        };

        let target = match self.rule.rewrite(raw) {
            Ok(url) => url,
            Err(_) => {
                tracing::debug!(url = raw, "Rejected proxy request with unparseable url");
                return Response::bad_request("bad url");
            }
        };

        tracing::debug!(
            upstream = %target,
            method = request.method.as_str(),
            range = request.range.as_deref().unwrap_or("-"),
            "Forwarding request to storage"
        );

        match self.fetch(&target, request).await {
            Ok(response) => {
                tracing::info!(
                    upstream = %target,
                    status = response.status.as_u16(),
                    range = request.range.as_deref().unwrap_or("-"),
                    "Upstream responded"
                );
                response
            }
            Err(e) => {
                tracing::warn!(upstream = %target, error = %e, "Upstream request failed");
                self.handle_proxy_error(&e)
            }
        }
    }

    /// Connects to `target`, sends the request and reads the response head.
    ///
    /// The returned response carries the filtered headers and the unread
    /// body. No retries are attempted.
    pub async fn fetch(
        &self,
        target: &Url,
        request: &ProxyRequest,
    ) -> Result<Response, UpstreamError> {
        let addr = upstream_addr(target)?;
        let request_bytes = self.build_upstream_request(request, target)?;

        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| UpstreamError::Timeout("connect"))?
            .map_err(|source| UpstreamError::Connect {
                addr: addr.clone(),
                source,
            })?;

        tracing::trace!(addr = %addr, "Connected to storage");

        timeout(
            self.response_timeout,
            self.exchange(stream, &request_bytes, request.method),
        )
        .await
        .map_err(|_| UpstreamError::Timeout("response head"))?
    }

    async fn exchange(
        &self,
        mut stream: TcpStream,
        request_bytes: &[u8],
        method: Method,
    ) -> Result<Response, UpstreamError> {
        stream.write_all(request_bytes).await?;
        stream.flush().await?;

        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
        let head = read_response_head(&mut stream, &mut buffer).await?;
        let framing = head.framing(method)?;

        let mut builder = ResponseBuilder::new(head.status).reason(head.reason.clone());
        for (name, value) in filter_headers(&head.headers) {
            // chunked framing supersedes any length the upstream also sent
            if framing == Framing::Chunked && name == "content-length" {
                continue;
            }
            builder = builder.header(name, value);
        }
        if framing == Framing::Chunked {
            builder = builder.header("Transfer-Encoding", "chunked");
        }

        let body = UpstreamBody::new(stream, buffer, framing, self.idle_timeout);
        Ok(builder.stream(body).build())
    }

    /// Build the request bytes sent to storage
    ///
    /// Only `Range` and `If-Range` are taken from the client.
    pub fn build_upstream_request(
        &self,
        request: &ProxyRequest,
        target: &Url,
    ) -> Result<Vec<u8>, UpstreamError> {
        let host = target.host_str().ok_or(UpstreamError::MissingHost)?;
        let host_value = match target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut path = target.path().to_string();
        if let Some(query) = target.query() {
            path.push('?');
            path.push_str(query);
        }

        let range = forwardable("Range", request.range.as_deref())?;
        let if_range = forwardable("If-Range", request.if_range.as_deref())?;

        let mut buffer = Vec::with_capacity(256);
        buffer.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method.as_str(), path).as_bytes(),
        );
        buffer.extend_from_slice(format!("Host: {}\r\n", host_value).as_bytes());

        if let Some(range) = range {
            buffer.extend_from_slice(format!("Range: {}\r\n", range).as_bytes());
        }
        if let Some(if_range) = if_range {
            buffer.extend_from_slice(format!("If-Range: {}\r\n", if_range).as_bytes());
        }

        // Byte ranges must address the stored bytes, not a compressed view
        buffer.extend_from_slice(b"Accept-Encoding: identity\r\n");
        buffer.extend_from_slice(b"Connection: close\r\n");
        buffer.extend_from_slice(b"\r\n");

        Ok(buffer)
    }

    /// Turns a transport failure into the response sent to the client
    fn handle_proxy_error(&self, error: &UpstreamError) -> Response {
        let status = error.status();
        let body = match status {
            StatusCode::BAD_REQUEST => "bad request",
            StatusCode::GATEWAY_TIMEOUT => "upstream timeout",
            _ => "upstream unavailable",
        };

        Response::text(status, body)
    }
}

/// Client header value to copy upstream, refusing anything that could end
/// the header line early.
fn forwardable<'a>(
    name: &'static str,
    value: Option<&'a str>,
) -> Result<Option<&'a str>, UpstreamError> {
    match value {
        Some(v) if has_control_bytes(v.as_bytes()) => {
            Err(UpstreamError::InvalidHeaderValue(name))
        }
        other => Ok(other),
    }
}

/// `host:port` to dial for `target`. Only plain http is spoken upstream.
pub fn upstream_addr(target: &Url) -> Result<String, UpstreamError> {
    if target.scheme() != "http" {
        return Err(UpstreamError::UnsupportedScheme(target.scheme().to_string()));
    }

    let host = target.host_str().ok_or(UpstreamError::MissingHost)?;
    let port = target.port_or_known_default().unwrap_or(80);

    Ok(format!("{}:{}", host, port))
}

/// Reads until a final (non-1xx) response head is complete.
///
/// Bytes after the head stay in `buffer`.
async fn read_response_head(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<UpstreamHead, UpstreamError> {
    loop {
        if let Some(headers_end) = find_headers_end(&buffer[..]) {
            let head_bytes = buffer.split_to(headers_end + 4);
            let head = parse_response_head(&head_bytes)?;

            // Skip interim responses such as 100 Continue
            let code = head.status.as_u16();
            if (100..200).contains(&code) && code != 101 {
                continue;
            }

            return Ok(head);
        }

        if buffer.len() > MAX_RESPONSE_HEAD {
            return Err(UpstreamError::HeadTooLarge(MAX_RESPONSE_HEAD));
        }

        buffer.reserve(BUFFER_SIZE);
        let n = stream.read_buf(buffer).await?;

        if n == 0 {
            return Err(UpstreamError::MalformedResponse(
                "connection closed before response head".to_string(),
            ));
        }
    }
}

/// Parse an upstream status line and header block
///
/// Works on bytes: header values are kept verbatim, whatever their encoding.
/// Lines carrying control characters other than tab are dropped.
pub fn parse_response_head(head_bytes: &[u8]) -> Result<UpstreamHead, UpstreamError> {
    let mut lines = head_bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let status_line = lines
        .next()
        .ok_or_else(|| UpstreamError::MalformedResponse("empty response".to_string()))?;
    let invalid_status_line = || {
        UpstreamError::MalformedResponse(format!(
            "invalid status line: {}",
            String::from_utf8_lossy(status_line)
        ))
    };

    let mut parts = status_line.splitn(3, |&b| b == b' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with(b"HTTP/") {
        return Err(invalid_status_line());
    }

    let status = parts
        .next()
        .and_then(|code| std::str::from_utf8(code).ok())
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(StatusCode::from_u16)
        .ok_or_else(invalid_status_line)?;
    let reason = parts.next().unwrap_or_default().trim_ascii();
    let reason = String::from_utf8_lossy(reason).into_owned();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if has_control_bytes(line) {
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let Ok(name) = std::str::from_utf8(line[..colon].trim_ascii()) else {
            continue;
        };

        headers.push((name.to_string(), line[colon + 1..].trim_ascii().to_vec()));
    }

    Ok(UpstreamHead {
        status,
        reason,
        headers,
    })
}
