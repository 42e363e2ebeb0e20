//! Middleware chain.
//!
//! Entries run for every request, in registration order, before routing.
//! The chain is append-only during setup and read-only while serving.

use crate::error::Error;
use crate::pipeline::hook::{Handler, Hook};

#[derive(Debug, Default)]
pub struct MiddlewareChain {
    hooks: Vec<Hook>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends middleware that runs on every path.
    pub fn add(&mut self, handler: Handler) {
        // An empty path always compiles.
        if let Ok(hook) = Hook::new("", handler) {
            self.hooks.push(hook);
        }
    }

    /// Appends middleware that runs only under `path`.
    pub fn mount(&mut self, path: impl Into<String>, handler: Handler) -> Result<(), Error> {
        self.hooks.push(Hook::new(path, handler)?);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }

    /// Whether a mounted hook covers a request with these path segments.
    pub fn applies(hook: &Hook, path: &[String]) -> bool {
        hook.pattern().matches_prefix(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
