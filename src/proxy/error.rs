//! Upstream failure classification.

use thiserror::Error;

use crate::http::response::StatusCode;

/// Why the forwarder could not obtain a response head from storage.
///
/// Client-supplied values unfit to forward are reported here too, before any
/// connection is made.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unsupported upstream scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{0} header contains control characters")]
    InvalidHeaderValue(&'static str),

    #[error("upstream URL has no host")]
    MissingHost,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream {0} timed out")]
    Timeout(&'static str),

    #[error("upstream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("upstream response head exceeds {0} bytes")]
    HeadTooLarge(usize),
}

impl UpstreamError {
    /// Status reported to the client when this failure ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamError::InvalidHeaderValue(_) => StatusCode::BAD_REQUEST,
            UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
