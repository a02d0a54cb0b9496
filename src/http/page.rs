//! Embedded control page

use rust_embed::RustEmbed;
use tracing::error;

use super::response::{Response, Status};

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

pub(crate) fn index() -> Response {
    match Assets::get("index.html") {
        Some(file) => Response::html(file.data.into_owned()),
        None => {
            error!("Control page missing from embedded assets");
            Response::text(Status::NotFound, "control page unavailable")
        }
    }
}
