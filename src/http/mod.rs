//! HTTP surface: request reading, lenient decoding, routing
//!
//! Transport-agnostic: everything here works on byte buffers or any
//! `Read + Write` stream. The accept loop lives in [`crate::server`].

pub mod decoder;
mod page;
pub mod request;
pub mod response;
pub mod router;

pub use request::{Request, RequestError, MAX_REQUEST_BYTES};
pub use response::{Response, Status};
pub use router::dispatch;
