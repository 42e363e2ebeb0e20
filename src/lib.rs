//! bweb - embeddable HTTP server core
//!
//! A middleware chain and per-method route table driven by a request
//! lifecycle state machine, a small HTTP/1.1 transport underneath it, and
//! JSON-RPC and body parsing middleware on top.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use error::Error;
pub use pipeline::{Callable, Context, Flow, Handler, HandlerResult, Sink};
pub use server::Server;
