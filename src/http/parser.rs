use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};

/// Default cap on the size of the request line plus headers.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Default cap on a declared `Content-Length`.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    UnsupportedEncoding,
    HeadersTooLarge,
    BodyTooLarge,
    Incomplete,
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, or
/// `ParseError::Incomplete` when more bytes are needed. A declared body
/// longer than `max_body_size` is rejected as soon as the headers are in,
/// before any of it has to be buffered.
pub fn parse_http_request(
    buf: &[u8],
    max_header_size: usize,
    max_body_size: usize,
) -> Result<(Request, usize), ParseError> {
    let headers_end = match find_headers_end(buf) {
        Some(end) if end > max_header_size => return Err(ParseError::HeadersTooLarge),
        Some(end) => end,
        None if buf.len() > max_header_size => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = HeaderMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.insert(key, value.trim());
    }

    if headers.contains("Transfer-Encoding") {
        return Err(ParseError::UnsupportedEncoding);
    }

    let content_length = headers
        .get("Content-Length")
        .map(|v| v.trim().parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    if content_length > max_body_size {
        return Err(ParseError::BodyTooLarge);
    }

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}
