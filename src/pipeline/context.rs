//! Per-request state handed to every middleware and route handler.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

use crate::error::Error;
use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};
use crate::pipeline::events::RequestEvents;

/// Request context.
///
/// Fields are public so middleware can inspect and enrich them before the
/// route handler runs: the body parser fills `body`, the JSON-RPC
/// middleware injects `query["wallet"]`, the router fills `params`.
#[derive(Debug)]
pub struct Context {
    pub method: Method,
    /// Normalized path without the query string, e.g. `/wallet/abc`.
    pub pathname: String,
    /// Non-empty segments of `pathname`. `/` has none.
    pub path: Vec<String>,
    pub query: Map<String, Value>,
    /// Parameters bound by the matched route pattern.
    pub params: HashMap<String, String>,
    pub headers: HeaderMap,
    /// Decoded body. `Null` until a body parser runs.
    pub body: Value,
    pub raw_body: Bytes,
    events: RequestEvents,
}

impl Context {
    /// Builds a context from a method and a request target such as
    /// `/search?q=rust`.
    ///
    /// Only origin-form targets are accepted: a single leading `/`. A
    /// target like `//wallet/abc` would otherwise be read as a host name.
    pub fn new(method: Method, target: &str) -> Result<Self, Error> {
        if !target.starts_with('/') || target.starts_with("//") {
            return Err(Error::BadRequest(format!("invalid request target {target:?}")));
        }

        let url = base_url()?
            .join(target)
            .map_err(|e| Error::BadRequest(format!("invalid request target {target:?}: {e}")))?;

        let path = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();

        Ok(Self {
            method,
            pathname: url.path().to_owned(),
            path,
            query,
            params: HashMap::new(),
            headers: HeaderMap::new(),
            body: Value::Null,
            raw_body: Bytes::new(),
            events: RequestEvents::new(),
        })
    }

    pub fn from_request(request: Request) -> Result<Self, Error> {
        let mut ctx = Self::new(request.method, &request.path)?;
        ctx.headers = request.headers;
        ctx.raw_body = Bytes::from(request.body);
        Ok(ctx)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("Content-Type").map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn query_str(&self, key: &str) -> Option<&str> {
        self.query.get(key).and_then(Value::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Registers a listener for request-scoped errors, such as the client
    /// disconnecting before a response was sent.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.events.on_error(listener);
    }

    pub fn events(&self) -> &RequestEvents {
        &self.events
    }
}

fn base_url() -> Result<Url, Error> {
    Url::parse("http://localhost/").map_err(|e| Error::BadRequest(e.to_string()))
}
