//! HTTP responses
//!
//! Every response closes the connection and carries the permissive CORS
//! headers so a page served from another origin can drive the T-bar.

use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NoContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Response {
    pub fn new(status: Status, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// 200 with `value` serialized as JSON
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(Status::Ok, "application/json; charset=utf-8", body),
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::json_error(Status::InternalServerError, "serialize")
            }
        }
    }

    /// `{"error":"<code>"}`
    pub fn json_error(status: Status, code: &str) -> Self {
        let body = serde_json::to_vec(&ErrorBody { error: code })
            .unwrap_or_else(|_| b"{}".to_vec());
        Self::new(status, "application/json; charset=utf-8", body)
    }

    pub fn no_content() -> Self {
        Self::new(Status::NoContent, "text/plain", Vec::new())
    }

    pub fn text(status: Status, body: &str) -> Self {
        Self::new(status, "text/plain", body.as_bytes())
    }

    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(Status::Ok, "text/html; charset=utf-8", body)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Access-Control-Allow-Methods: GET,POST,OPTIONS\r\n\
             \r\n",
            self.status.code(),
            self.status.reason(),
            self.content_type,
            self.body.len(),
        );
        out.write_all(head.as_bytes())?;
        out.write_all(&self.body)?;
        out.flush()
    }
}
