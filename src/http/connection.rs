use std::io;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::http::parser::{parse_http_request, ParseError, MAX_BODY_SIZE, MAX_HEADER_SIZE};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::pipeline::{Context, Dispatcher, RequestEvents, Sink};

/// Transport settings a connection needs.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub keep_alive: bool,
    pub max_header_size: usize,
    pub max_body_size: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_header_size: MAX_HEADER_SIZE,
            max_body_size: MAX_BODY_SIZE,
            request_timeout: None,
        }
    }
}

impl From<&ServerConfig> for ConnectionOptions {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            keep_alive: cfg.keep_alive,
            max_header_size: cfg.max_header_size,
            max_body_size: cfg.max_body_size,
            request_timeout: cfg.request_timeout(),
        }
    }
}

pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
    state: ConnectionState,
    dispatcher: Arc<Dispatcher>,
    options: ConnectionOptions,
    /// Set when pipelined input outgrew what one request may hold while a
    /// response was pending. The connection closes after that response.
    overflowed: bool,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum ReadOutcome {
    Request(Request),
    Malformed(StatusCode),
    Eof,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, dispatcher: Arc<Dispatcher>, options: ConnectionOptions) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            dispatcher,
            options,
            overflowed: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.state = match mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req) => ConnectionState::Processing(req),
                    ReadOutcome::Malformed(status) => {
                        let response = finish_response(Response::error(status), false, false);
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                    ReadOutcome::Eof => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = self.options.keep_alive && req.keep_alive();
                    let head = req.method == Method::HEAD;

                    match self.process(req).await {
                        Some(response) => {
                            let keep_alive = keep_alive
                                && !self.overflowed
                                && !response
                                    .headers
                                    .get("Connection")
                                    .is_some_and(|v| v.eq_ignore_ascii_case("close"));
                            let response = finish_response(response, keep_alive, head);
                            ConnectionState::Writing(ResponseWriter::new(&response), keep_alive)
                        }
                        None => ConnectionState::Closed,
                    }
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            match parse_http_request(
                &self.buffer,
                self.options.max_header_size,
                self.options.max_body_size,
            ) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(ReadOutcome::Request(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => {
                    debug!(error = ?e, "malformed request");
                    let status = match e {
                        ParseError::HeadersTooLarge => StatusCode::HEADERS_TOO_LARGE,
                        ParseError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                        ParseError::UnsupportedEncoding => StatusCode::NOT_IMPLEMENTED,
                        _ => StatusCode::BAD_REQUEST,
                    };
                    return Ok(ReadOutcome::Malformed(status));
                }
            }

            let mut temp = [0u8; 1024];
            let n = match self.stream.read(&mut temp).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => 0,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                // Client closed connection
                return Ok(ReadOutcome::Eof);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    /// Runs the dispatcher for one request on its own task and waits for
    /// the response, a disconnect, or the request timeout.
    ///
    /// Returns `None` when the request was aborted; nothing must be written
    /// in that case.
    async fn process(&mut self, request: Request) -> Option<Response> {
        let ctx = match Context::from_request(request) {
            Ok(ctx) => ctx,
            Err(err) => return Some(Response::error(err.status())),
        };

        let events = ctx.events().clone();
        let (sink, mut done) = Sink::new();

        let dispatcher = Arc::clone(&self.dispatcher);
        let task_sink = sink.clone();
        let mut task = tokio::spawn(async move { dispatcher.dispatch(ctx, task_sink).await });

        let request_timeout = self.options.request_timeout;
        let timeout = async move {
            match request_timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);

        let pipeline_limit = self.options.max_header_size.saturating_add(self.options.max_body_size);
        let mut temp = [0u8; 1024];

        loop {
            tokio::select! {
                biased;

                result = &mut done => {
                    return result.ok();
                }

                joined = &mut task => {
                    if let Err(e) = joined {
                        warn!(error = %e, "dispatcher task failed");
                    }
                    if !sink.is_closed() {
                        sink.error(StatusCode::INTERNAL_SERVER_ERROR);
                    }
                    return done.try_recv().ok();
                }

                read = self.stream.read(&mut temp) => match read {
                    Ok(0) | Err(_) => {
                        abort(&sink, &events, "client disconnected");
                        return None;
                    }
                    Ok(n) => {
                        // Pipelined bytes for the next request. Past the limit
                        // they are dropped but the socket is still watched.
                        if self.overflowed || self.buffer.len() + n > pipeline_limit {
                            self.overflowed = true;
                            self.buffer.clear();
                        } else {
                            self.buffer.extend_from_slice(&temp[..n]);
                        }
                    }
                },

                _ = &mut timeout => {
                    abort(&sink, &events, "request timed out");
                    return None;
                }
            }
        }
    }
}

fn abort(sink: &Sink, events: &RequestEvents, reason: &str) {
    if sink.abort() {
        warn!(reason, "request aborted before response");
        events.emit(&Error::ConnectionAborted(reason.to_owned()));
    }
}

fn finish_response(mut response: Response, keep_alive: bool, head: bool) -> Response {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    response.headers.insert("Connection", connection);
    if head {
        response.body.clear();
    }
    response
}
