//! Response sink with idempotent close.
//!
//! A [`Sink`] is shared between the handler task and the connection that
//! owns the socket. Both may try to close it: the handler by sending a
//! response, the connection by aborting when the client goes away. Every
//! transition happens under the state lock, and the `closed` flag only ever
//! moves from `false` to `true`, so whichever side gets there first wins and
//! the other becomes a no-op.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::http::headers::HeaderMap;
use crate::http::response::{error_body, Response, ResponseBuilder, StatusCode};

#[derive(Clone)]
pub struct Sink {
    inner: Arc<Inner>,
}

struct Inner {
    closed: AtomicBool,
    aborted: AtomicBool,
    state: Mutex<Pending>,
}

struct Pending {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    done: Option<oneshot::Sender<Response>>,
}

impl Sink {
    /// Creates a sink and the receiver that gets the finished response.
    ///
    /// The receiver resolves exactly once with the response when a handler
    /// closes the sink, or errors if the sink was aborted instead.
    pub fn new() -> (Sink, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let sink = Sink {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                aborted: AtomicBool::new(false),
                state: Mutex::new(Pending {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Vec::new(),
                    done: Some(tx),
                }),
            }),
        };
        (sink, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// True when the sink was closed by a client disconnect or timeout
    /// rather than by a response.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    pub fn status(&self) -> StatusCode {
        self.inner.state.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.update(|state| state.status = status);
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.state.lock().headers.get(name).map(str::to_owned)
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.update(|state| state.headers.insert(name, value));
    }

    pub fn remove_header(&self, name: &str) {
        self.update(|state| {
            state.headers.remove(name);
        });
    }

    /// Appends a chunk to the buffered body without closing.
    pub fn write(&self, chunk: impl AsRef<[u8]>) {
        self.update(|state| state.body.extend_from_slice(chunk.as_ref()));
    }

    /// Replaces the body, sets status and content type, and closes.
    ///
    /// Returns `true` only for the call that actually closed the sink.
    pub fn send(&self, status: StatusCode, body: impl Into<Vec<u8>>, content_type: &str) -> bool {
        let body = body.into();
        self.finish(|state| {
            state.status = status;
            state.headers.insert("Content-Type", content_type);
            state.body = body;
        })
    }

    /// Serializes `value` and sends it as `application/json`.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> serde_json::Result<bool> {
        let body = serde_json::to_vec(value)?;
        Ok(self.send(status, body, "application/json"))
    }

    /// Sends the standard plain-text error response for `status`.
    pub fn error(&self, status: StatusCode) -> bool {
        self.send(status, error_body(status), "text/plain")
    }

    /// Closes with whatever status, headers and body were set so far.
    pub fn end(&self) -> bool {
        self.finish(|_| {})
    }

    /// Closes without producing a response. Called by the transport when
    /// the client has gone away.
    pub fn abort(&self) -> bool {
        let mut state = self.inner.state.lock();
        if self.is_closed() {
            return false;
        }
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.closed.store(true, Ordering::Release);
        state.done.take();
        true
    }

    fn update(&self, apply: impl FnOnce(&mut Pending)) {
        let mut state = self.inner.state.lock();
        if !self.is_closed() {
            apply(&mut state);
        }
    }

    fn finish(&self, apply: impl FnOnce(&mut Pending)) -> bool {
        let mut state = self.inner.state.lock();
        if self.is_closed() {
            return false;
        }

        apply(&mut state);
        self.inner.closed.store(true, Ordering::Release);

        let response = ResponseBuilder::new(state.status)
            .headers(mem::take(&mut state.headers))
            .body(mem::take(&mut state.body))
            .build();

        if let Some(tx) = state.done.take() {
            // The receiver is gone only if the connection already dropped.
            let _ = tx.send(response);
        }
        true
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("closed", &self.is_closed())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
