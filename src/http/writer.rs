use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes the status line and headers.
///
/// Adds `connection: close` when the connection will not be reused.
pub fn serialize_head(resp: &Response, keep_alive: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.reason
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in &resp.headers {
        if k == "connection" {
            continue;
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v);
        buf.extend_from_slice(b"\r\n");
    }

    if !keep_alive {
        buf.extend_from_slice(b"connection: close\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Whether the client connection can carry another request after `resp`.
///
/// Bodies delimited by upstream connection close can only be framed the same
/// way towards the client.
pub fn is_reusable(resp: &Response) -> bool {
    match &resp.body {
        Body::Full(_) => true,
        Body::Upstream(body) => !body.is_close_delimited(),
    }
}

/// Adapts `resp` for an HTTP/1.0 client, which cannot read chunked framing.
///
/// A chunked upstream body is decoded on the fly and ended by closing the
/// connection.
pub fn downgrade_to_http10(resp: &mut Response) {
    if let Body::Upstream(body) = &mut resp.body {
        body.decode_chunks();
        if body.is_close_delimited() {
            resp.headers.remove("transfer-encoding");
        }
    }
}

pub struct ResponseWriter {
    head: Vec<u8>,
    body: Body,
    /// Responses to HEAD keep their headers but send no body
    send_body: bool,
}

impl ResponseWriter {
    pub fn new(response: Response, keep_alive: bool, send_body: bool) -> Self {
        Self {
            head: serialize_head(&response, keep_alive),
            body: response.body,
            send_body,
        }
    }

    /// Writes the head, then the body. Returns the number of body bytes sent.
    pub async fn write_to_stream<W>(self, stream: &mut W) -> anyhow::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        stream.write_all(&self.head).await?;

        if !self.send_body {
            stream.flush().await?;
            return Ok(0);
        }

        let sent = match self.body {
            Body::Full(bytes) => {
                stream.write_all(&bytes).await?;
                stream.flush().await?;
                bytes.len() as u64
            }
            Body::Upstream(body) => body.relay(stream).await?,
        };

        Ok(sent)
    }
}
