//! HTTP/1.1 front end.
//!
//! A small hand-written server: enough of HTTP/1.1 to accept proxy requests
//! from browsers and stream responses back, with keep-alive support.
//!
//! # Architecture
//!
//! - **`connection`**: per-client request/response state machine and routing
//! - **`parser`**: parses incoming HTTP requests from byte buffers
//! - **`request`**: request representation, header and query helpers
//! - **`response`**: status codes, in-memory and streamed bodies
//! - **`writer`**: serializes the head and relays the body to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route; for /proxy, fetch the upstream head
//!        └──────┬───────────┘
//!               │ Response head ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send head, then stream the body
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
