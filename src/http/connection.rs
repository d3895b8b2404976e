use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::{downgrade_to_http10, is_reusable, ResponseWriter};
use crate::proxy::upstream::{ProxyHandler, ProxyRequest};

pub struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
    state: ConnectionState,
    handler: Arc<ProxyHandler>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, handler: Arc<ProxyHandler>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            handler,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await {
                        Ok(Some(req)) => ConnectionState::Processing(req),
                        Ok(None) => ConnectionState::Closed,
                        Err(e) => {
                            // Answer once, then drop the connection
                            tracing::debug!("Malformed request: {:?}", e);
                            let response = Response::bad_request("bad request");
                            let writer = ResponseWriter::new(response, false, true);
                            ConnectionState::Writing(writer, false)
                        }
                    };
                }

                ConnectionState::Processing(req) => {
                    let mut response = self.route(&req).await;
                    if req.version == "HTTP/1.0" {
                        downgrade_to_http10(&mut response);
                    }
                    let keep_alive = req.keep_alive() && is_reusable(&response);
                    let send_body = req.method != Method::HEAD;

                    let writer = ResponseWriter::new(response, keep_alive, send_body);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        self.state = ConnectionState::Reading; // go back for next request
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Err(e),
            }

            let mut temp = [0u8; 1024];
            let n = match self.stream.read(&mut temp).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("Client read error: {}", e);
                    return Ok(None);
                }
            };

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    async fn route(&self, req: &Request) -> Response {
        match (req.method, req.route()) {
            (Method::GET | Method::HEAD, "/proxy") => {
                self.handler
                    .forward(&ProxyRequest::from_request(req))
                    .await
            }
            (_, "/proxy") => Response::method_not_allowed("GET, HEAD"),
            (Method::GET | Method::HEAD, "/healthz") => Response::ok("ok"),
            _ => Response::not_found(),
        }
    }
}
