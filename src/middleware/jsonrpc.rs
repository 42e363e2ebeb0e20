//! JSON-RPC over HTTP.
//!
//! Accepts `POST /` (or `POST /wallet/<id>` with wallet multiplexing) whose
//! body is a JSON-RPC request object or a batch array of them, hands it to
//! an [`RpcCall`] implementation, and writes the result back as JSON with a
//! trailing newline. Requests that do not fit are declined so later
//! middleware and routes still get a chance.

use std::future::Future;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::http::request::Method;
use crate::http::response::StatusCode;
use crate::pipeline::{Callable, Context, Flow, Handler, HandlerResult, Sink};

/// Advertised on every RPC response.
pub const LONG_POLLING_HEADER: &str = "X-Long-Polling";
pub const LONG_POLLING_PATH: &str = "/?longpoll=1";

/// The RPC backend.
///
/// `body` is the decoded request (object or batch array); `query` is the
/// request query, including the `wallet` key when multiplexing is on.
/// Returning `None` answers with JSON `null`.
pub trait RpcCall: Send + Sync {
    fn call(
        &self,
        body: &Value,
        query: &Map<String, Value>,
    ) -> impl Future<Output = anyhow::Result<Option<Value>>> + Send;
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct JsonRpcOptions {
    /// Serve `/wallet/<id>` as well as `/`, binding `query.wallet`.
    pub wallet: bool,
}

pub struct JsonRpc<R> {
    rpc: R,
    options: JsonRpcOptions,
}

/// Builds the JSON-RPC middleware around `rpc`.
pub fn json_rpc<R: RpcCall + 'static>(rpc: R, options: JsonRpcOptions) -> Handler {
    Handler::object(JsonRpc { rpc, options })
}

impl<R: RpcCall> JsonRpc<R> {
    /// Applies the path rules, binding `query.wallet` when multiplexing.
    /// Returns false when the request is not for us.
    fn accept_path(&self, ctx: &mut Context) -> bool {
        if !self.options.wallet {
            return ctx.pathname == "/";
        }

        match ctx.path.as_slice() {
            [] => {
                ctx.query.insert("wallet".to_owned(), Value::Null);
                true
            }
            [prefix, id] if prefix == "wallet" => {
                let id = Value::String(id.clone());
                ctx.query.insert("wallet".to_owned(), id);
                true
            }
            _ => false,
        }
    }
}

/// A single request, or every member of a batch, must carry a string `method`.
fn is_rpc_shape(body: &Value) -> bool {
    fn has_method(request: &Value) -> bool {
        request.get("method").is_some_and(Value::is_string)
    }

    match body {
        Value::Array(batch) => batch.iter().all(has_method),
        request => has_method(request),
    }
}

impl<R: RpcCall> Callable for JsonRpc<R> {
    async fn call(&self, ctx: &mut Context, sink: &Sink) -> HandlerResult {
        if ctx.method != Method::POST {
            return Ok(Flow::Next);
        }

        if !self.accept_path(ctx) {
            trace!(path = %ctx.pathname, "json-rpc declined path");
            return Ok(Flow::Next);
        }

        if !is_rpc_shape(&ctx.body) {
            debug!(path = %ctx.pathname, "json-rpc declined malformed request");
            return Ok(Flow::Next);
        }

        let result = self.rpc.call(&ctx.body, &ctx.query).await?;

        let mut json = serde_json::to_string(&result.unwrap_or(Value::Null))?;
        json.push('\n');

        sink.set_header(LONG_POLLING_HEADER, LONG_POLLING_PATH);
        sink.send(StatusCode::OK, json, "application/json");

        Ok(Flow::Done)
    }
}
