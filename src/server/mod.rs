//! Server builder: registration surface and listener startup.

pub mod listener;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::http::connection::ConnectionOptions;
use crate::http::request::Method;
use crate::pipeline::{
    Context, Dispatcher, ErrorHandler, ErrorReport, Handler, MiddlewareChain, RouteTable, Sink,
};

pub use listener::Listener;

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Collects middleware and routes, then freezes them into a [`Dispatcher`].
///
/// Registration happens before serving; once frozen the chain and table
/// are shared read-only by every connection.
pub struct Server {
    middleware: MiddlewareChain,
    routes: RouteTable,
    error_handler: Option<Arc<ErrorHandler>>,
    errors: broadcast::Sender<ErrorReport>,
    options: ConnectionOptions,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            middleware: MiddlewareChain::new(),
            routes: RouteTable::new(),
            error_handler: None,
            errors,
            options: ConnectionOptions::default(),
        }
    }

    pub fn with_config(cfg: &ServerConfig) -> Self {
        let mut server = Self::new();
        server.options = ConnectionOptions::from(cfg);
        server
    }

    /// Appends middleware that runs for every request.
    pub fn use_middleware(&mut self, handler: Handler) -> &mut Self {
        self.middleware.add(handler);
        self
    }

    /// Appends middleware that runs only for paths under `path`.
    pub fn mount(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.middleware.mount(path, handler)?;
        Ok(self)
    }

    pub fn route(&mut self, method: Method, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.routes.register(method, path, handler)?;
        Ok(self)
    }

    pub fn get(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.route(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.route(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.route(Method::PUT, path, handler)
    }

    pub fn del(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.route(Method::DELETE, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: Handler) -> Result<&mut Self, Error> {
        self.route(Method::PATCH, path, handler)
    }

    /// Overrides how handler faults are turned into responses.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Error, &Context, &Sink) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorReport> {
        self.errors.subscribe()
    }

    /// Freezes registration.
    pub fn dispatcher(self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            self.middleware,
            self.routes,
            self.error_handler,
            self.errors,
        ))
    }

    /// Freezes registration and binds a listener on `addr`.
    pub async fn bind(self, addr: &str) -> anyhow::Result<Listener> {
        let options = self.options.clone();
        Listener::bind(addr, self.dispatcher(), options).await
    }
}
