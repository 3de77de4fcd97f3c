//! screenrec recorder server
//!
//! Captures one monitor at a throttled rate into a bounded in-memory window
//! and flushes it to disk on request. Driven over a local control channel by
//! short-lived client processes.

pub mod capture;
pub mod ipc;
pub mod state;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::capture::{JpegEncoder, PlatformBackend};
use crate::ipc::{RecorderServer, ServerError};
use crate::state::RecorderState;

/// Global shutdown flag
static SHUTDOWN_FLAG: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();

/// Get the global shutdown flag.
pub fn get_shutdown_flag() -> Arc<AtomicBool> {
    SHUTDOWN_FLAG
        .get_or_init(|| Arc::new(AtomicBool::new(false)))
        .clone()
}

/// Request server shutdown.
pub fn request_shutdown() {
    info!("Shutdown requested");
    get_shutdown_flag().store(true, Ordering::SeqCst);
}

/// Check if shutdown has been requested.
pub fn is_shutdown_requested() -> bool {
    get_shutdown_flag().load(Ordering::SeqCst)
}

/// Runtime configuration of the server role.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Unix socket path or Windows pipe name
    pub channel_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            channel_path: screenrec_common::ipc::channel_path(),
        }
    }
}

/// Serve control requests until killed or signalled.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    info!("screenrec server starting (pid: {})...", std::process::id());
    setup_signal_handlers();

    let state = RecorderState::new(Arc::new(PlatformBackend), Arc::new(JpegEncoder::default()));
    match state.list_monitors() {
        Ok(monitors) => info!("{} monitors available", monitors.len()),
        Err(e) => warn!("Monitor enumeration failed: {}", e),
    }

    let mut server = RecorderServer::new(state, get_shutdown_flag());
    let result = ipc::serve(&mut server, &config.channel_path).await;

    // Cleanup
    server.state_mut().shutdown();
    info!("screenrec server stopped");
    result
}

/// Set up signal handlers for graceful shutdown.
fn setup_signal_handlers() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let signals = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        );
        let (mut sigterm, mut sigint, mut sighup) = match signals {
            (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
            _ => {
                warn!("Failed to install signal handlers");
                return;
            }
        };

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sighup.recv() => info!("Received SIGHUP"),
            }
            request_shutdown();
        });
    }

    #[cfg(windows)]
    {
        // Windows uses Ctrl+C handler
        if let Err(e) = ctrlc::set_handler(|| {
            info!("Received Ctrl+C");
            request_shutdown();
        }) {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    }
}
