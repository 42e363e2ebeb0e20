//! Request lifecycle state machine.
//!
//! ```text
//!   Received ─► Middleware ─► Routing ─► Handling ─► Finalized
//!       │            │            │           │
//!       └────────────┴─── Aborted ┴───────────┘
//! ```
//!
//! Middleware and the route handler run strictly one after another; each
//! is awaited before the next starts. Any stage may close the sink, which
//! ends the request. The transport may abort the sink at any time, and the
//! dispatcher stops at the next stage boundary when it notices.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::pipeline::context::Context;
use crate::pipeline::events::ErrorReport;
use crate::pipeline::hook::{Flow, Handler, Hook};
use crate::pipeline::middleware::MiddlewareChain;
use crate::pipeline::router::RouteTable;
use crate::pipeline::sink::Sink;

/// Caller-supplied formatter for handler faults.
///
/// If it leaves the sink open the default `HTTP Error: 500.` is sent.
pub type ErrorHandler = dyn Fn(&Error, &Context, &Sink) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Middleware,
    Routing,
    Handling,
    Finalized,
    Aborted,
}

pub struct Dispatcher {
    middleware: MiddlewareChain,
    routes: RouteTable,
    error_handler: Option<Arc<ErrorHandler>>,
    errors: broadcast::Sender<ErrorReport>,
}

impl Dispatcher {
    pub(crate) fn new(
        middleware: MiddlewareChain,
        routes: RouteTable,
        error_handler: Option<Arc<ErrorHandler>>,
        errors: broadcast::Sender<ErrorReport>,
    ) -> Self {
        Self { middleware, routes, error_handler, errors }
    }

    /// Subscribes to the server-level fault channel.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorReport> {
        self.errors.subscribe()
    }

    /// Drives one request to completion and returns the terminal stage.
    ///
    /// On return the sink is always closed.
    pub async fn dispatch(&self, mut ctx: Context, sink: Sink) -> Stage {
        trace!(method = %ctx.method, path = %ctx.pathname, stage = ?Stage::Received, "request received");

        debug!(method = %ctx.method, path = %ctx.pathname, stage = ?Stage::Middleware, "running middleware");
        for hook in self.middleware.iter() {
            if sink.is_closed() {
                return self.finalize(&ctx, &sink);
            }

            if !MiddlewareChain::applies(hook, &ctx.path) {
                continue;
            }

            match invoke(hook, &mut ctx, &sink).await {
                Ok(Flow::Next) if !sink.is_closed() => continue,
                Ok(_) => {
                    if !sink.is_closed() {
                        sink.end();
                    }
                    return self.finalize(&ctx, &sink);
                }
                Err(err) => {
                    self.fault(err, &ctx, &sink);
                    return self.finalize(&ctx, &sink);
                }
            }
        }

        if sink.is_closed() {
            return self.finalize(&ctx, &sink);
        }

        debug!(method = %ctx.method, path = %ctx.pathname, stage = ?Stage::Routing, "resolving route");
        let Some(route) = self.routes.resolve(ctx.method, &ctx.path) else {
            self.not_found(&ctx, &sink);
            return self.finalize(&ctx, &sink);
        };
        let hook = route.hook;
        ctx.params = route.params;

        debug!(method = %ctx.method, path = %ctx.pathname, route = hook.path(), stage = ?Stage::Handling, "invoking route");
        match invoke(hook, &mut ctx, &sink).await {
            Ok(Flow::Done) => {
                if !sink.is_closed() {
                    sink.end();
                }
            }
            Ok(Flow::Next) => {
                if !sink.is_closed() {
                    self.not_found(&ctx, &sink);
                }
            }
            Err(err) => self.fault(err, &ctx, &sink),
        }

        self.finalize(&ctx, &sink)
    }

    fn not_found(&self, ctx: &Context, sink: &Sink) {
        let err = Error::NotFound {
            method: ctx.method.to_string(),
            path: ctx.pathname.clone(),
        };
        debug!(error = %err, "no route matched");
        sink.error(err.status());
    }

    fn fault(&self, err: Error, ctx: &Context, sink: &Sink) {
        error!(method = %ctx.method, path = %ctx.pathname, error = %err, "handler fault");

        let err = Arc::new(err);
        // No subscribers is fine.
        let _ = self.errors.send(ErrorReport {
            error: Arc::clone(&err),
            method: ctx.method,
            pathname: ctx.pathname.clone(),
        });

        if sink.is_closed() {
            return;
        }

        if let Some(handler) = &self.error_handler {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&*err, ctx, sink))).is_err() {
                warn!(method = %ctx.method, path = %ctx.pathname, "error handler panicked");
            }
        }

        if !sink.is_closed() {
            sink.error(err.status());
        }
    }

    fn finalize(&self, ctx: &Context, sink: &Sink) -> Stage {
        if sink.is_aborted() {
            debug!(method = %ctx.method, path = %ctx.pathname, stage = ?Stage::Aborted, "request aborted");
            return Stage::Aborted;
        }

        if !sink.is_closed() {
            sink.end();
        }

        trace!(method = %ctx.method, path = %ctx.pathname, status = sink.status().as_u16(), stage = ?Stage::Finalized, "request finalized");
        Stage::Finalized
    }
}

/// Runs one hook to completion, turning errors and panics into faults.
async fn invoke(hook: &Hook, ctx: &mut Context, sink: &Sink) -> Result<Flow, Error> {
    let outcome = match hook.handler() {
        Handler::Sync(f) => panic::catch_unwind(AssertUnwindSafe(|| (**f)(ctx, sink))),
        Handler::Async(f) => AssertUnwindSafe((**f)(ctx, sink)).catch_unwind().await,
        Handler::Object(obj) => AssertUnwindSafe(obj.call_dyn(ctx, sink)).catch_unwind().await,
    };

    match outcome {
        Ok(Ok(flow)) => Ok(flow),
        Ok(Err(err)) => Err(Error::HandlerFault(format!("{err:#}"))),
        Err(panic) => Err(Error::HandlerFault(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}
