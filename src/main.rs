use serde_json::{json, Map, Value};

use bweb::config::Config;
use bweb::middleware::{body_parser, json_rpc, RpcCall};
use bweb::Server;

/// Minimal RPC backend for the demo binary: `ping` and `echo`.
struct DemoRpc;

impl DemoRpc {
    fn answer(request: &Value, query: &Map<String, Value>) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        match request.get("method").and_then(Value::as_str) {
            Some("ping") => json!({ "result": "pong", "error": null, "id": id }),
            Some("echo") => json!({
                "result": { "params": params, "wallet": query.get("wallet") },
                "error": null,
                "id": id,
            }),
            Some(method) => json!({
                "result": null,
                "error": { "code": -32601, "message": format!("Method not found: {method}") },
                "id": id,
            }),
            None => json!({
                "result": null,
                "error": { "code": -32600, "message": "Invalid request" },
                "id": id,
            }),
        }
    }
}

impl RpcCall for DemoRpc {
    async fn call(&self, body: &Value, query: &Map<String, Value>) -> anyhow::Result<Option<Value>> {
        let response = match body {
            Value::Array(batch) => Value::Array(batch.iter().map(|r| Self::answer(r, query)).collect()),
            request => Self::answer(request, query),
        };
        Ok(Some(response))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };
    cfg.validate()?;

    bweb::logging::init(&cfg.log);

    let mut server = Server::with_config(&cfg.server);
    server.use_middleware(body_parser(cfg.body_parser.clone()));

    if cfg.jsonrpc.enabled {
        server.use_middleware(json_rpc(DemoRpc, cfg.jsonrpc.options));
    }

    let listener = server.bind(&cfg.server.listen_addr).await?;

    listener
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
}
