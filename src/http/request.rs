//! Minimal HTTP/1.x request reader
//!
//! One request per connection. The whole request must fit in
//! [`MAX_REQUEST_BYTES`]; it is read with at most two reads and never
//! streamed.

use std::io::{self, Read};
use thiserror::Error;

use super::decoder::parse_int_prefix;

/// Upper bound on a request, headers and body together
pub const MAX_REQUEST_BYTES: usize = 8192;

/// Longest accepted method token
pub const MAX_METHOD_LEN: usize = 15;

/// Longest accepted request target
pub const MAX_PATH_LEN: usize = 255;

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("empty request line")]
    EmptyRequestLine,
    #[error("missing request target")]
    MissingTarget,
    #[error("method longer than {MAX_METHOD_LEN} bytes")]
    MethodTooLong,
    #[error("request target longer than {MAX_PATH_LEN} bytes")]
    PathTooLong,
}

/// Parsed request: method, target, and whatever body arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl Request {
    /// Parse a raw request buffer
    ///
    /// The body is everything after the first blank line. When the header
    /// terminator is missing the body is empty.
    pub fn parse(raw: &[u8]) -> Result<Self, RequestError> {
        let line_end = raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(raw.len());
        let line = String::from_utf8_lossy(&raw[..line_end]);
        let mut parts = line.split_ascii_whitespace();

        let method = parts.next().ok_or(RequestError::EmptyRequestLine)?;
        let path = parts.next().ok_or(RequestError::MissingTarget)?;
        if method.len() > MAX_METHOD_LEN {
            return Err(RequestError::MethodTooLong);
        }
        if path.len() > MAX_PATH_LEN {
            return Err(RequestError::PathTooLong);
        }

        let body = match find(raw, HEADER_END) {
            Some(at) => &raw[at + HEADER_END.len()..],
            None => &[][..],
        };

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    /// Methods are case-sensitive tokens
    pub fn is(&self, method: &str) -> bool {
        self.method == method
    }
}

/// Read one request from `stream`
///
/// `Ok(None)` when the peer closed without sending anything. If the header
/// block is complete but the declared body has not fully arrived, one more
/// read fills what space is left; an error on that read keeps the partial
/// body. A body declared larger than the buffer is cut at
/// [`MAX_REQUEST_BYTES`], not rejected.
pub fn read_raw<S: Read>(stream: &mut S) -> io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let mut len = stream.read(&mut buf)?;
    if len == 0 {
        return Ok(None);
    }

    if let Some(at) = find(&buf[..len], HEADER_END) {
        let declared = find_header_value(&buf[..at], "content-length")
            .and_then(|v| parse_int_prefix(&v))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let received = len - (at + HEADER_END.len());

        if declared > received && len < MAX_REQUEST_BYTES {
            let wanted = (declared - received).min(MAX_REQUEST_BYTES - len);
            if let Ok(more) = stream.read(&mut buf[len..len + wanted]) {
                len += more;
            }
        }
    }

    buf.truncate(len);
    Ok(Some(buf))
}

/// Value of the first header named `name` (ASCII case-insensitive)
///
/// Only CRLF-terminated lines are considered; leading spaces and tabs are
/// stripped from the value.
pub fn find_header_value(head: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(head);
    text.split("\r\n").skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.eq_ignore_ascii_case(name) {
            Some(value.trim_start_matches([' ', '\t']).to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
