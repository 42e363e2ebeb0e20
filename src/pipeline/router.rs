//! Per-method route table with first-match resolution.

use std::collections::HashMap;

use crate::error::Error;
use crate::http::request::Method;
use crate::pipeline::hook::{Handler, Hook};

/// Routes grouped by method, kept in registration order.
///
/// Resolution is a linear scan: the first registered pattern that matches
/// wins, so an earlier route always shadows a later one that could also
/// match. Methods never fall back to each other.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<Hook>>,
}

/// A resolved route and the parameters its pattern bound.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub hook: &'a Hook,
    pub params: HashMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Duplicate patterns are allowed; the first wins.
    pub fn register(&mut self, method: Method, path: impl Into<String>, handler: Handler) -> Result<(), Error> {
        let hook = Hook::new(path, handler)?;
        self.routes.entry(method).or_default().push(hook);
        Ok(())
    }

    pub fn resolve(&self, method: Method, path: &[String]) -> Option<RouteMatch<'_>> {
        self.routes
            .get(&method)?
            .iter()
            .find_map(|hook| {
                hook.pattern()
                    .matches(path)
                    .map(|params| RouteMatch { hook, params })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
