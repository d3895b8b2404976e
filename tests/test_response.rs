use stremmer::http::response::{Response, ResponseBuilder, StatusCode};
use stremmer::http::writer::{serialize_head, ResponseWriter};

#[test]
fn test_status_code_values() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::PARTIAL_CONTENT.as_u16(), 206);
    assert_eq!(StatusCode::NOT_MODIFIED.as_u16(), 304);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE.as_u16(), 416);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.as_u16(), 504);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::PARTIAL_CONTENT.reason_phrase(), "Partial Content");
    assert_eq!(StatusCode::BAD_GATEWAY.reason_phrase(), "Bad Gateway");
    assert_eq!(StatusCode::from_u16(599).unwrap().reason_phrase(), "");
}

#[test]
fn test_status_code_bodyless() {
    assert!(StatusCode::NOT_MODIFIED.is_bodyless());
    assert!(StatusCode::from_u16(204).unwrap().is_bodyless());
    assert!(!StatusCode::PARTIAL_CONTENT.is_bodyless());
}

#[test]
fn test_response_builder_auto_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .body(b"This is the body".to_vec())
        .build();

    assert_eq!(response.header("Content-Length"), Some("16"));
    assert_eq!(response.reason, "OK");
}

#[test]
fn test_response_builder_keeps_custom_reason() {
    let response = ResponseBuilder::new(StatusCode::PARTIAL_CONTENT)
        .reason("Partial")
        .build();

    assert_eq!(response.reason, "Partial");
}

#[test]
fn test_response_builder_lowercases_header_names() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "video/mp4")
        .build();

    assert!(response.headers.contains_key("content-type"));
    assert_eq!(response.header("CONTENT-TYPE"), Some("video/mp4"));
}

#[test]
fn test_bad_request_helper() {
    let response = Response::bad_request("missing url");

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body.as_bytes(), Some(&b"missing url"[..]));
    assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
}

#[test]
fn test_method_not_allowed_helper() {
    let response = Response::method_not_allowed("GET, HEAD");

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("GET, HEAD"));
}

#[test]
fn test_serialize_head_status_line_and_close() {
    let response = Response::ok("ok");
    let head = String::from_utf8(serialize_head(&response, false)).unwrap();

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("content-length: 2\r\n"));
    assert!(head.contains("connection: close\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_writer_omits_body_for_head() {
    let mut out = Vec::new();
    let sent = ResponseWriter::new(Response::ok("hello"), true, false)
        .write_to_stream(&mut out)
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(sent, 0);
    assert!(text.contains("content-length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_writer_sends_full_body() {
    let mut out = Vec::new();
    let sent = ResponseWriter::new(Response::ok("hello"), true, true)
        .write_to_stream(&mut out)
        .await
        .unwrap();

    assert_eq!(sent, 5);
    assert!(String::from_utf8(out).unwrap().ends_with("\r\n\r\nhello"));
}
