//! Loopback HTTP listener
//!
//! A single dedicated thread accepts connections on `127.0.0.1:<port>` and
//! serves them one at a time: read, dispatch, write, close. Handlers only
//! touch the shared [`ServiceContext`]; mixer work is queued to the host
//! actor.
//!
//! [`TbarServer::stop`] is the only shutdown path. It blocks until the
//! accept thread has exited, so no handler runs once it returns.

#[cfg(test)]
mod tests;

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::context::ServiceContext;
use crate::http::{dispatch, request, Request, Response, Status};

pub use crate::config::DEFAULT_PORT;

/// Per-connection read timeout, so a stalled client cannot wedge the loop
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `stop()` waits when poking the listener awake
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("listener socket error: {0}")]
    Io(#[from] io::Error),
}

struct Worker {
    /// Port that was asked for (0 when an ephemeral port was requested)
    port: u16,
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Owns the listener thread
pub struct TbarServer {
    ctx: Arc<ServiceContext>,
    worker: Option<Worker>,
}

impl TbarServer {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx, worker: None }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// False once stopped, or once the accept loop died on its own
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire))
    }

    /// Configured port of the running listener
    pub fn port(&self) -> Option<u16> {
        self.worker.as_ref().map(|w| w.port)
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.worker.as_ref().map(|w| w.addr)
    }

    /// Listen on `127.0.0.1:<port>`; port 0 falls back to [`DEFAULT_PORT`]
    ///
    /// No-op when already running.
    pub fn start(&mut self, port: u16) -> Result<(), ServerError> {
        let port = if port == 0 {
            warn!("Invalid port 0, using default {}", DEFAULT_PORT);
            DEFAULT_PORT
        } else {
            port
        };
        self.start_at(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
    }

    pub(crate) fn start_at(&mut self, addr: SocketAddr) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a loop that exited after an accept failure
        self.stop();

        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let bound = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let ctx = Arc::clone(&self.ctx);
            let stop = Arc::clone(&stop);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("tbar-web-listener".to_string())
                .spawn(move || accept_loop(listener, ctx, stop, running))
                .map_err(ServerError::Spawn)?
        };

        info!("🚀 tbar-web listening on http://{}/", bound);
        self.worker = Some(Worker {
            port: addr.port(),
            addr: bound,
            stop,
            running,
            thread,
        });
        Ok(())
    }

    /// Stop the listener and wait for its thread to exit
    ///
    /// No-op when not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.store(true, Ordering::Release);
        if worker.running.load(Ordering::Acquire) {
            // std has no way to close a listener from another thread; a
            // throwaway connection makes the blocked accept return.
            if let Err(e) = TcpStream::connect_timeout(&worker.addr, WAKE_TIMEOUT) {
                debug!("Wake connection to {} failed: {}", worker.addr, e);
            }
        }

        if worker.thread.join().is_err() {
            error!("Listener thread panicked");
        }
        info!("tbar-web stopped (was {})", worker.addr);
    }

    /// Bring the listener in line with `config`
    ///
    /// Disabled stops it, a port change restarts it, otherwise it is
    /// started if needed.
    pub fn apply(&mut self, config: &ServiceConfig) -> Result<(), ServerError> {
        if !config.enabled {
            self.stop();
            return Ok(());
        }

        if self.is_running() && self.port() != Some(config.port) {
            info!(
                "Port changed {:?} -> {}, restarting listener",
                self.port(),
                config.port
            );
            self.stop();
        }

        self.start(config.port)
    }
}

impl Drop for TbarServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ServiceContext>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                debug!("Connection from {}", peer);
                if let Err(e) = stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT)) {
                    warn!("Cannot set read timeout for {}: {}", peer, e);
                }
                handle_connection(&mut stream, &ctx);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !stop.load(Ordering::Acquire) {
                    error!("❌ Listener failed, not accepting connections anymore: {}", e);
                }
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    debug!("Accept loop exited");
}

/// Serve one request on `stream`
///
/// Generic over the transport so it can be driven without sockets.
pub fn handle_connection<S: Read + Write>(stream: &mut S, ctx: &ServiceContext) {
    let raw = match request::read_raw(stream) {
        Ok(Some(raw)) => raw,
        Ok(None) => return,
        Err(e) => {
            debug!("Failed to read request: {}", e);
            return;
        }
    };

    let response = match Request::parse(&raw) {
        Ok(req) => {
            debug!("{} {}", req.method, req.path);
            dispatch(&req, ctx)
        }
        Err(e) => {
            debug!("Malformed request: {}", e);
            Response::text(Status::BadRequest, "bad request")
        }
    };

    if let Err(e) = response.write_to(stream) {
        debug!("Failed to write response: {}", e);
    }
}
