//! HTTP/1.1 transport.
//!
//! This is the collaborator the pipeline sits on: it turns bytes into
//! requests, hands each request to the [`Dispatcher`](crate::pipeline::Dispatcher),
//! and writes back whatever the response sink produced.
//!
//! - **`connection`**: per-connection state machine, including abort detection
//! - **`parser`**: parses incoming HTTP requests from byte buffers
//! - **`request`**: wire-level request and method types
//! - **`response`**: status codes and responses
//! - **`headers`**: case-insensitive header map
//! - **`writer`**: serializes and writes HTTP responses to the client
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
//!        │   Processing     │ ← Dispatcher runs on its own task
//!        └──────┬───────────┘
//!               │ Sink closed ──────────► Writing
//!               │ Client gone / timeout ─► Closed (sink aborted)
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
