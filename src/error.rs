//! Error taxonomy shared by the pipeline and its collaborators.

use thiserror::Error;

use crate::http::response::StatusCode;

#[derive(Debug, Error)]
pub enum Error {
    /// Setup-time contract violation (bad hook path, bad options).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No route matched the request.
    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },

    /// The request body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A middleware or route handler returned an error or panicked.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// The client went away (disconnect or transport timeout) mid-request.
    #[error("connection aborted: {0}")]
    ConnectionAborted(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Status used when this error is turned into a response.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ConnectionAborted(_) => StatusCode::REQUEST_TIMEOUT,
            Error::InvalidArgument(_) | Error::HandlerFault(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::ConnectionAborted(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
