//! Middleware shipped with the server.

pub mod body_parser;
pub mod jsonrpc;

pub use body_parser::{body_parser, BodyKind, BodyParserOptions};
pub use jsonrpc::{json_rpc, JsonRpcOptions, RpcCall};
