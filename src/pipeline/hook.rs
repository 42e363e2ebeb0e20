//! Hooks: immutable bindings of a path pattern to a handler.
//!
//! Handlers come in three shapes, fixed when the hook is built:
//!
//! - [`Handler::sync`] wraps a plain function that finishes immediately.
//! - [`Handler::future`] wraps a function returning a boxed future.
//! - [`Handler::object`] wraps any value implementing [`Callable`].
//!
//! The dispatcher invokes all three the same way and awaits the result
//! before moving on, so middleware order is always registration order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Error;
use crate::pipeline::context::Context;
use crate::pipeline::pattern::Pattern;
use crate::pipeline::sink::Sink;

/// What a handler wants the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Not handled here; continue with the next stage.
    Next,
    /// Handled; stop the chain.
    Done,
}

/// Outcome of one handler invocation. `Err` is a handler fault.
pub type HandlerResult = anyhow::Result<Flow>;

type SyncFn = dyn Fn(&mut Context, &Sink) -> HandlerResult + Send + Sync;
type AsyncFn = dyn for<'a> Fn(&'a mut Context, &'a Sink) -> BoxFuture<'a, HandlerResult> + Send + Sync;

/// An object exposing a `call` capability.
pub trait Callable: Send + Sync {
    fn call(&self, ctx: &mut Context, sink: &Sink) -> impl Future<Output = HandlerResult> + Send;
}

/// Object-safe form of [`Callable`], implemented for every `Callable`.
pub trait CallableDyn: Send + Sync {
    fn call_dyn<'a>(&'a self, ctx: &'a mut Context, sink: &'a Sink) -> BoxFuture<'a, HandlerResult>;
}

impl<T: Callable> CallableDyn for T {
    fn call_dyn<'a>(&'a self, ctx: &'a mut Context, sink: &'a Sink) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.call(ctx, sink))
    }
}

#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    Object(Arc<dyn CallableDyn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut Context, &Sink) -> HandlerResult + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous handler:
    ///
    /// ```
    /// # use bweb::pipeline::{Flow, Handler};
    /// let handler = Handler::future(|_ctx, sink| {
    ///     Box::pin(async move {
    ///         sink.end();
    ///         Ok(Flow::Done)
    ///     })
    /// });
    /// assert_eq!(handler.arity(), 2);
    /// ```
    pub fn future<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, &'a Sink) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Handler::Async(Arc::new(f))
    }

    pub fn object<C: Callable + 'static>(callable: C) -> Self {
        Handler::Object(Arc::new(callable))
    }

    /// Declared parameter count. Functions take `(ctx, sink)`; objects
    /// report 0. Informational only.
    pub fn arity(&self) -> usize {
        match self {
            Handler::Sync(_) | Handler::Async(_) => 2,
            Handler::Object(_) => 0,
        }
    }

    pub fn is_async(&self) -> bool {
        !matches!(self, Handler::Sync(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Handler::Sync(_) => "sync",
            Handler::Async(_) => "async",
            Handler::Object(_) => "object",
        };
        f.debug_tuple("Handler").field(&kind).finish()
    }
}

/// A path bound to a handler.
#[derive(Debug, Clone)]
pub struct Hook {
    path: String,
    pattern: Pattern,
    handler: Handler,
    arity: usize,
}

impl Hook {
    /// Fails with `InvalidArgument` when `path` is neither empty nor an
    /// absolute pattern.
    pub fn new(path: impl Into<String>, handler: Handler) -> Result<Self, Error> {
        let path = path.into();
        let pattern = Pattern::parse(&path)?;
        let arity = handler.arity();

        Ok(Self { path, pattern, handler, arity })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}
