//! Control-channel server: one client at a time, one request at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use screenrec_common::ipc::{read_line, write_line, IpcError, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use super::handlers::{handle_request, Directive};
use crate::state::RecorderState;

/// How often blocking waits re-check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Socket file permissions (owner read/write only)
#[cfg(unix)]
const SOCKET_MODE: u32 = 0o600;

/// Socket directory permissions (owner read/write/execute only)
#[cfg(unix)]
const DIRECTORY_MODE: u32 = 0o700;

/// Error type for the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("a recorder is already listening on {0}")]
    AlreadyRunning(String),
    #[error("invalid channel path {0}")]
    InvalidChannel(String),
}

/// How a client connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Client left; wait for the next one
    Disconnected,
    /// Server must stop (kill request or shutdown signal)
    Shutdown,
}

/// Dispatches control lines against the recorder state.
pub struct RecorderServer {
    state: RecorderState,
    shutdown: Arc<AtomicBool>,
}

impl RecorderServer {
    pub fn new(state: RecorderState, shutdown: Arc<AtomicBool>) -> Self {
        Self { state, shutdown }
    }

    pub fn state_mut(&mut self) -> &mut RecorderState {
        &mut self.state
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Decode and execute one request line.
    pub async fn dispatch(&mut self, line: &str) -> (Response, Directive) {
        match Request::decode(line) {
            Ok(request) => handle_request(&mut self.state, request).await,
            Err(e) => {
                warn!("Rejected request {:?}: {}", line, e);
                (Response::error(e.to_string()), Directive::Continue)
            }
        }
    }

    /// Serve a single connected client until it disconnects or kills the server.
    pub async fn handle_client<S>(&mut self, stream: S) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("Client connected");
        let mut stream = BufReader::new(stream);
        let shutdown = Arc::clone(&self.shutdown);

        loop {
            let line = tokio::select! {
                line = read_line(&mut stream) => line,
                _ = wait_for_shutdown(&shutdown) => {
                    info!("Shutdown requested, dropping client");
                    return ConnectionOutcome::Shutdown;
                }
            };

            let line = match line {
                Ok(line) => line,
                Err(IpcError::ConnectionClosed) => {
                    info!("Client disconnected");
                    return ConnectionOutcome::Disconnected;
                }
                Err(IpcError::Malformed(e)) => {
                    warn!("Malformed request: {}", e);
                    let response = Response::error(format!("malformed request: {}", e));
                    if let Err(e) = write_line(&mut stream, &response.encode()).await {
                        warn!("Failed to deliver response, dropping client: {}", e);
                        return ConnectionOutcome::Disconnected;
                    }
                    continue;
                }
                Err(e) => {
                    error!("Error reading request: {}", e);
                    return ConnectionOutcome::Disconnected;
                }
            };

            let (response, directive) = self.dispatch(&line).await;
            debug!("Responding {:?} to {:?}", response, line);

            // A failed send is an implicit disconnect, but a kill still stands
            if let Err(e) = write_line(&mut stream, &response.encode()).await {
                warn!("Failed to deliver response, dropping client: {}", e);
                return match directive {
                    Directive::Shutdown => ConnectionOutcome::Shutdown,
                    _ => ConnectionOutcome::Disconnected,
                };
            }

            match directive {
                Directive::Continue => {}
                Directive::Disconnect => {
                    info!("Client disconnected");
                    return ConnectionOutcome::Disconnected;
                }
                Directive::Shutdown => return ConnectionOutcome::Shutdown,
            }
        }
    }
}

async fn wait_for_shutdown(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
}

/// Create the socket directory with secure permissions.
///
/// Only a directory created here is restricted; an existing parent (for a
/// channel override such as `/tmp/recorder.sock`) is left untouched. A
/// leftover socket is removed unless a live recorder still answers on it.
#[cfg(unix)]
fn create_secure_socket_dir(socket_path: &Path) -> Result<(), ServerError> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| ServerError::InvalidChannel(socket_path.display().to_string()))?;

    if !socket_dir.exists() {
        std::fs::create_dir_all(socket_dir)?;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(DIRECTORY_MODE))?;
    }

    if socket_path.exists() {
        if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
            return Err(ServerError::AlreadyRunning(socket_path.display().to_string()));
        }
        info!("Removing stale socket {:?}", socket_path);
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// Set socket file permissions after binding.
#[cfg(unix)]
fn secure_socket_file(socket_path: &Path) -> std::io::Result<()> {
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    let actual = std::fs::metadata(socket_path)?.permissions().mode() & 0o777;
    if actual != SOCKET_MODE {
        warn!("Socket mode is {:o}, expected {:o}", actual, SOCKET_MODE);
    }

    Ok(())
}

/// Run the accept loop until a kill request or shutdown signal (Unix).
#[cfg(unix)]
pub async fn serve(server: &mut RecorderServer, socket_path: &Path) -> Result<(), ServerError> {
    use tokio::net::UnixListener;

    info!("Starting recorder server at {:?}", socket_path);
    create_secure_socket_dir(socket_path)?;
    let listener = UnixListener::bind(socket_path)?;
    secure_socket_file(socket_path)?;
    info!("Recorder server listening on {:?}", socket_path);

    loop {
        if server.is_shutdown_requested() {
            info!("Shutdown requested, stopping recorder server");
            break;
        }

        let accept_result = tokio::select! {
            result = listener.accept() => Some(result),
            _ = tokio::time::sleep(SHUTDOWN_POLL) => None,
        };

        let stream = match accept_result {
            Some(Ok((stream, _))) => stream,
            Some(Err(e)) => {
                error!("Accept error: {}", e);
                continue;
            }
            None => continue,
        };

        // Serve inline: the next client waits in the backlog
        if server.handle_client(stream).await == ConnectionOutcome::Shutdown {
            info!("Recorder server shutting down");
            break;
        }
    }

    drop(listener);
    if let Err(e) = std::fs::remove_file(socket_path) {
        warn!("Failed to remove socket file: {}", e);
    } else {
        info!("Removed socket file: {:?}", socket_path);
    }

    Ok(())
}

/// Run the accept loop until a kill request or shutdown signal (Windows).
///
/// A single pipe instance is reused so that only one client can attach.
#[cfg(windows)]
pub async fn serve(server: &mut RecorderServer, pipe_path: &Path) -> Result<(), ServerError> {
    use tokio::net::windows::named_pipe::ServerOptions;

    info!("Starting recorder server at {:?}", pipe_path);
    let mut pipe = match ServerOptions::new()
        .first_pipe_instance(true)
        .max_instances(1)
        .create(pipe_path)
    {
        Ok(pipe) => pipe,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ServerError::AlreadyRunning(pipe_path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    info!("Recorder server listening on {:?}", pipe_path);

    loop {
        if server.is_shutdown_requested() {
            info!("Shutdown requested, stopping recorder server");
            break;
        }

        let connected = tokio::select! {
            result = pipe.connect() => Some(result),
            _ = tokio::time::sleep(SHUTDOWN_POLL) => None,
        };

        match connected {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!("Accept error: {}", e);
                continue;
            }
            None => continue,
        }

        let outcome = server.handle_client(&mut pipe).await;
        if let Err(e) = pipe.disconnect() {
            warn!("Failed to disconnect pipe client: {}", e);
        }
        if outcome == ConnectionOutcome::Shutdown {
            info!("Recorder server shutting down");
            break;
        }
    }

    Ok(())
}
