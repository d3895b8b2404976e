#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stremmer::config::UpstreamConfig;
use stremmer::proxy::rewrite::RewriteRule;
use stremmer::proxy::upstream::ProxyHandler;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// Fake object store answering every connection with the same bytes.
pub struct MockUpstream {
    pub addr: SocketAddr,
    /// Raw request heads received, in arrival order
    pub requests: mpsc::UnboundedReceiver<String>,
}

impl MockUpstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn mock_upstream(response: impl Into<Vec<u8>>) -> MockUpstream {
    let response = response.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 1024];
                loop {
                    let n = socket.read(&mut tmp).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&tmp[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream { addr, requests: rx }
}

/// Upstream serving a long body one byte every 50 ms.
///
/// The receiver fires once the proxy side of the connection is gone (EOF,
/// reset or a failed write).
pub async fn trickling_upstream() -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut buf = Vec::new();
        let mut tmp = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut tmp).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
            }
        }

        let head = b"HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 1000000\r\n\r\n";
        if socket.write_all(head).await.is_err() {
            return;
        }

        let (mut reader, mut writer) = socket.split();
        let mut scratch = [0u8; 64];
        loop {
            tokio::select! {
                read = reader.read(&mut scratch) => {
                    if matches!(read, Ok(0) | Err(_)) {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    if writer.write_all(b"x").await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = tx.send(());
    });

    (addr, rx)
}

/// Upstream that accepts connections but never answers.
pub async fn silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn upstream_config(response_timeout_secs: u64) -> UpstreamConfig {
    UpstreamConfig {
        connect_timeout_secs: 2,
        response_timeout_secs,
        idle_timeout_secs: 5,
    }
}

pub fn handler() -> ProxyHandler {
    handler_with(upstream_config(5))
}

pub fn handler_with(upstream: UpstreamConfig) -> ProxyHandler {
    let rule = RewriteRule::new(
        vec!["localhost".to_string(), "127.0.0.1".to_string()],
        vec![9100, 9000],
        Url::parse("http://minio-old:9000").unwrap(),
    );
    ProxyHandler::new(rule, &upstream)
}

/// Starts the full server on an ephemeral port.
pub async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(stremmer::server::listener::serve(listener, Arc::new(handler())));

    addr
}

pub fn encode(url: &str) -> String {
    url::form_urlencoded::byte_serialize(url.as_bytes()).collect()
}
