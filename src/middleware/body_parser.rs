//! Body parser middleware.
//!
//! Decodes `Context::raw_body` into `Context::body` before any later
//! middleware sees the request. A body that fails to decode ends the
//! request with `400 Bad Request`; an oversized one with `413`.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::http::request::Method;
use crate::pipeline::{Callable, Context, Flow, Handler, HandlerResult, Sink};

/// How the body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    /// Always JSON, whatever the Content-Type says.
    Json,
    /// Always `application/x-www-form-urlencoded`.
    Form,
    /// Chosen from the Content-Type header.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BodyParserOptions {
    pub kind: BodyKind,
    pub max_body_size: usize,
}

impl Default for BodyParserOptions {
    fn default() -> Self {
        Self {
            kind: BodyKind::Auto,
            max_body_size: 1024 * 1024,
        }
    }
}

pub struct BodyParser {
    options: BodyParserOptions,
}

/// Builds the body parser as a middleware handler.
pub fn body_parser(options: BodyParserOptions) -> Handler {
    Handler::object(BodyParser { options })
}

impl BodyParser {
    fn decode(&self, ctx: &Context) -> Result<Value, Error> {
        let raw = &ctx.raw_body;

        if raw.len() > self.options.max_body_size {
            return Err(Error::PayloadTooLarge {
                size: raw.len(),
                limit: self.options.max_body_size,
            });
        }

        if raw.is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let kind = match self.options.kind {
            BodyKind::Auto => match ctx.content_type().as_deref() {
                Some("application/json") => BodyKind::Json,
                Some(ct) if ct.ends_with("+json") => BodyKind::Json,
                Some("application/x-www-form-urlencoded") => BodyKind::Form,
                _ => return Ok(Value::Object(Map::new())),
            },
            kind => kind,
        };

        match kind {
            BodyKind::Json => serde_json::from_slice(raw)
                .map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}"))),
            BodyKind::Form => Ok(Value::Object(
                url::form_urlencoded::parse(raw)
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect(),
            )),
            BodyKind::Auto => Ok(Value::Object(Map::new())),
        }
    }
}

impl Callable for BodyParser {
    async fn call(&self, ctx: &mut Context, sink: &Sink) -> HandlerResult {
        if matches!(ctx.method, Method::GET | Method::HEAD) {
            return Ok(Flow::Next);
        }

        match self.decode(ctx) {
            Ok(body) => {
                ctx.body = body;
                Ok(Flow::Next)
            }
            Err(err) => {
                debug!(method = %ctx.method, path = %ctx.pathname, error = %err, "rejecting request body");
                sink.error(err.status());
                Ok(Flow::Done)
            }
        }
    }
}
