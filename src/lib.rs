//! tbar-web - HTTP T-bar control for live-production video mixers
//!
//! Exposes a loopback-only HTTP surface that turns a stream of fader
//! positions (and a release signal) into start/drive/commit/cancel
//! operations on a host mixer's manual transition.
//!
//! ## Layout
//!
//! - [`server`]: blocking accept loop on a dedicated thread
//! - [`http`]: request reader, lenient body decoder, route dispatcher
//! - [`transition`]: the transition state machine and its host-context actor
//! - [`mixer`]: the host mixer contract plus OBS and console backends
//! - [`config`] / [`paths`]: persisted settings and where they live

pub mod config;
pub mod context;
pub mod http;
pub mod mixer;
pub mod paths;
pub mod server;
pub mod transition;

pub use config::{ConfigStore, MixerKind, ServiceConfig};
pub use context::{ServiceContext, TbarState};
pub use server::{ServerError, TbarServer, DEFAULT_PORT};
