//! Media streaming proxy
//!
//! Relays `GET /proxy?url=...` requests to object storage: the target URL is
//! rewritten to the storage's internal address, range headers are forwarded,
//! and the upstream status, allow-listed headers and body are streamed back.

pub mod body;
pub mod error;
pub mod headers;
pub mod rewrite;
pub mod upstream;

pub use error::UpstreamError;
pub use rewrite::{InvalidUrl, RewriteRule};
pub use upstream::{ProxyHandler, ProxyRequest};
