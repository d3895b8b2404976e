use stremmer::http::parser::parse_http_request;
use stremmer::http::request::{Method, Request};

fn parse(raw: &str) -> Request {
    let (request, _) = parse_http_request(raw.as_bytes()).unwrap();
    request
}

fn get(path: &str, headers: &[(&str, &str)]) -> Request {
    let mut raw = format!("GET {} HTTP/1.1\r\n", path);
    for (k, v) in headers {
        raw.push_str(&format!("{}: {}\r\n", k, v));
    }
    raw.push_str("\r\n");
    parse(&raw)
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let req = get("/", &[("Range", "bytes=0-99"), ("If-Range", "\"abc\"")]);

    assert_eq!(req.header("range"), Some("bytes=0-99"));
    assert_eq!(req.header("IF-RANGE"), Some("\"abc\""));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = get("/", &[]);
    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_close() {
    let req = get("/", &[("Connection", "close")]);
    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_http10() {
    let req = parse("GET / HTTP/1.0\r\n\r\n");
    assert_eq!(req.version, "HTTP/1.0");
    assert!(!req.keep_alive());

    let req = parse("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
    assert!(req.keep_alive());
}

#[test]
fn test_request_route_strips_query() {
    let req = get("/proxy?url=http%3A%2F%2Fa%2Fb.mp4", &[]);

    assert_eq!(req.route(), "/proxy");
    assert_eq!(req.query(), Some("url=http%3A%2F%2Fa%2Fb.mp4"));
}

#[test]
fn test_request_query_param_is_decoded() {
    let req = get("/proxy?x=1&url=http%3A%2F%2Flocalhost%3A9100%2Farchivos%2Fa%20b.mp4", &[]);

    assert_eq!(
        req.query_param("url").as_deref(),
        Some("http://localhost:9100/archivos/a b.mp4")
    );
    assert_eq!(req.query_param("x").as_deref(), Some("1"));
    assert_eq!(req.query_param("missing"), None);
}

#[test]
fn test_request_query_param_without_query() {
    let req = get("/proxy", &[]);
    assert_eq!(req.query_param("url"), None);
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    assert_eq!(Method::from_str("INVALID"), None);
    assert_eq!(Method::from_str("get"), None); // Case-sensitive
    assert_eq!(Method::HEAD.as_str(), "HEAD");
}
