//! Error notification channels.
//!
//! Two scopes exist. [`RequestEvents`] belongs to a single request and is
//! how the transport tells interested handlers that the client went away.
//! [`ErrorReport`]s go out on a server-wide broadcast channel for
//! observability; nothing on that channel affects request handling.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Error;
use crate::http::request::Method;

type Listener = Box<dyn Fn(&Error) + Send + Sync>;

/// Request-scoped error listeners.
#[derive(Clone, Default)]
pub struct RequestEvents {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl RequestEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Delivers `error` to every listener. A panicking listener is logged
    /// and skipped; it never reaches the caller.
    pub fn emit(&self, error: &Error) {
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(error))).is_err() {
                warn!(error = %error, "request error listener panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RequestEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEvents")
            .field("listeners", &self.len())
            .finish()
    }
}

/// A fault reported on the server-level channel.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error: Arc<Error>,
    pub method: Method,
    pub pathname: String,
}
