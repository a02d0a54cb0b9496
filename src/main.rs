//! tbar-web - HTTP T-bar control for OBS Studio
//!
//! Serves a small control page and a JSON API on loopback that drive the
//! studio-mode manual transition of a host mixer.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tbar_web::config::{ConfigStore, MixerKind, ServiceConfig};
use tbar_web::context::{ServiceContext, TbarState};
use tbar_web::mixer::{ConsoleMixer, HostMixer, ObsMixer};
use tbar_web::paths::AppPaths;
use tbar_web::server::TbarServer;
use tbar_web::transition::{HostActor, TransitionController};

/// tbar-web - Drive a studio-mode transition from a web page or fader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (defaults to the platform data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write a daily rotating log file into the logs directory
    #[arg(long)]
    log_file: bool,

    /// Listen on this port for this run only
    #[arg(short, long)]
    port: Option<u16>,

    /// Host mixer backend
    #[arg(short, long, value_enum)]
    mixer: Option<MixerKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();

    let _log_guard = init_logging(&args.log_level, args.log_file.then_some(&paths))?;

    info!("Starting tbar-web v{}...", env!("CARGO_PKG_VERSION"));
    info!(
        "Data directory: {} ({})",
        paths.base_dir().display(),
        if paths.is_portable { "portable" } else { "installed" }
    );

    let store = ConfigStore::new(args.config.clone().unwrap_or_else(|| paths.config.clone()));
    info!("Configuration file: {}", store.path().display());

    let mut config = store.load();
    if let Some(port) = args.port.filter(|&p| p != 0) {
        config.port = port;
    }
    if let Some(mixer) = args.mixer {
        config.mixer = mixer;
    }

    let mixer = connect_mixer(&config).await?;

    let state = Arc::new(TbarState::default());
    let controller = TransitionController::new(Arc::clone(&mixer), Arc::clone(&state));
    let (host, host_task) = HostActor::spawn(controller, config.queue_capacity);

    let (apply_tx, apply_rx) = mpsc::unbounded_channel();
    let ctx = Arc::new(ServiceContext::new(
        config.clone(),
        Some(store),
        state,
        host.clone(),
        apply_tx,
    ));

    let mut server = TbarServer::new(ctx);
    if config.enabled {
        // Not fatal, the service keeps running without a listener
        if let Err(e) = server.apply(&config) {
            error!("❌ Failed to start the HTTP listener: {}", e);
        }
    } else {
        info!("HTTP control is disabled in the settings file");
    }

    run_app(&mut server, apply_rx, shutdown_signal()).await;

    tokio::task::block_in_place(|| server.stop());
    if let Err(e) = host.flush().await {
        warn!("Host queue not drained: {}", e);
    }
    drop(server);
    drop(host);
    if let Err(e) = host_task.await {
        warn!("Host actor ended abnormally: {}", e);
    }
    if let Err(e) = mixer.shutdown().await {
        warn!("Mixer shutdown failed: {}", e);
    }

    info!("tbar-web shutdown complete");
    Ok(())
}

async fn connect_mixer(config: &ServiceConfig) -> Result<Arc<dyn HostMixer>> {
    match config.mixer {
        MixerKind::Obs => {
            let obs = config.obs_or_default();
            let local = matches!(obs.host.as_str(), "localhost" | "127.0.0.1");
            if local && obs.port == config.port {
                warn!(
                    "tbar-web and obs-websocket are both set to port {}; change one of them",
                    config.port
                );
            }
            let mixer: Arc<dyn HostMixer> = Arc::new(ObsMixer::connect(&obs).await?);
            Ok(mixer)
        }
        MixerKind::Console => {
            info!("🖥️  Using the console mixer (no OBS connection)");
            let mixer: Arc<dyn HostMixer> = Arc::new(ConsoleMixer::new());
            Ok(mixer)
        }
    }
}

/// Supervisor loop: re-applies settings changed over HTTP until shutdown
///
/// The listener cannot restart itself from its own thread, so `/config`
/// posts land here.
async fn run_app(
    server: &mut TbarServer,
    mut apply_rx: mpsc::UnboundedReceiver<ServiceConfig>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(config) = apply_rx.recv() => {
                // stop() joins the listener thread
                let result = tokio::task::block_in_place(|| server.apply(&config));
                if let Err(e) = result {
                    error!("Failed to apply settings: {}", e);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping listener");
                break;
            }
        }
    }
}

fn init_logging(level: &str, file_in: Option<&AppPaths>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match file_in {
        Some(paths) => {
            paths.ensure_logs_dir()?;
            let appender = tracing_appender::rolling::daily(&paths.logs_dir, "tbar-web.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
