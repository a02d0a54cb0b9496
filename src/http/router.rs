//! Route table and handlers

use serde::Serialize;
use tracing::{debug, info, warn};

use super::decoder::{decode_config_update, decode_position_update};
use super::page;
use super::request::Request;
use super::response::{Response, Status};
use crate::context::ServiceContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Page,
    Config,
    Status,
    Tbar,
    Favicon,
}

const ROUTES: &[(&str, Route)] = &[
    ("/", Route::Page),
    ("/index.html", Route::Page),
    ("/config", Route::Config),
    ("/status", Route::Status),
    ("/tbar", Route::Tbar),
    ("/favicon.ico", Route::Favicon),
];

fn lookup(path: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find_map(|(known, route)| (*known == path).then_some(*route))
}

#[derive(Serialize)]
struct ConfigBody {
    enabled: bool,
    port: u16,
}

#[derive(Serialize)]
struct ConfigSaved {
    ok: bool,
    enabled: bool,
    port: u16,
}

#[derive(Serialize)]
struct StatusBody {
    ok: bool,
    enabled: bool,
    port: u16,
    manual_active: bool,
    last_position: f64,
}

#[derive(Serialize)]
struct CachedPosition {
    position: f64,
    source: &'static str,
}

#[derive(Serialize)]
struct Accepted {
    ok: bool,
}

/// Map one request onto its handler
pub fn dispatch(req: &Request, ctx: &ServiceContext) -> Response {
    if req.is("OPTIONS") {
        return Response::no_content();
    }

    let Some(route) = lookup(&req.path) else {
        debug!("{} {} -> 404", req.method, req.path);
        return Response::json_error(Status::NotFound, "not_found");
    };

    let get = req.is("GET");
    let post = req.is("POST");

    match route {
        Route::Favicon => Response::no_content(),
        Route::Page if get => page::index(),
        Route::Config if get => get_config(ctx),
        Route::Config if post => post_config(req, ctx),
        Route::Status if get => get_status(ctx),
        Route::Tbar if get => get_tbar(ctx),
        Route::Tbar if post => post_tbar(req, ctx),
        _ => {
            debug!("{} {} -> 405", req.method, req.path);
            Response::json_error(Status::MethodNotAllowed, "method_not_allowed")
        }
    }
}

fn get_config(ctx: &ServiceContext) -> Response {
    let config = ctx.config();
    Response::json(&ConfigBody {
        enabled: config.enabled,
        port: config.port,
    })
}

fn post_config(req: &Request, ctx: &ServiceContext) -> Response {
    let update = decode_config_update(&req.body);
    let config = ctx.update_config(update);
    info!(
        "Config updated via HTTP: enabled={} port={}",
        config.enabled, config.port
    );
    Response::json(&ConfigSaved {
        ok: true,
        enabled: config.enabled,
        port: config.port,
    })
}

fn get_status(ctx: &ServiceContext) -> Response {
    let config = ctx.config();
    let state = ctx.state();
    Response::json(&StatusBody {
        ok: true,
        enabled: config.enabled,
        port: config.port,
        manual_active: state.manual_active(),
        last_position: state.last_position(),
    })
}

fn get_tbar(ctx: &ServiceContext) -> Response {
    Response::json(&CachedPosition {
        position: ctx.state().last_position(),
        source: "cached",
    })
}

fn post_tbar(req: &Request, ctx: &ServiceContext) -> Response {
    let Some(update) = decode_position_update(&req.body) else {
        debug!("POST /tbar without a usable position: {:?}", req.body);
        return Response::json_error(Status::BadRequest, "invalid_json");
    };

    match ctx.submit_position(update) {
        Ok(()) => {
            debug!(
                "T-bar {:.4}{}",
                update.position,
                if update.release { " (release)" } else { "" }
            );
            Response::json(&Accepted { ok: true })
        }
        Err(e) => {
            warn!("Dropping T-bar update: {}", e);
            Response::json_error(Status::InternalServerError, "oom")
        }
    }
}
