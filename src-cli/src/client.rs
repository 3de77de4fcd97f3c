//! Control-channel client for the recorder server.
//!
//! [`RecorderClient`] is a thin request/response wrapper over any byte stream.
//! The free functions handle reaching a server: a single probe, a bounded
//! retry loop, and the bootstrap path that launches a detached server first.

use std::future::Future;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use screenrec_common::ipc::{
    read_line, write_line, IpcError, Request, Response, ResponseError, StartOptions,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info};

/// Error type for recorder client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No server could be reached
    #[error("could not connect to the recorder after {attempts} attempt(s): {reason}")]
    ConnectionFailed { attempts: u32, reason: String },
    /// The server process could not be launched
    #[error("failed to launch the recorder: {0}")]
    SpawnFailed(String),
    /// I/O failure while talking to a connected server
    #[error("control channel error: {0}")]
    Channel(#[from] IpcError),
    /// The server answered with something that is not a valid response
    #[error("invalid response from the recorder: {0}")]
    Protocol(#[from] ResponseError),
    /// The server rejected the request
    #[error("{0}")]
    Remote(String),
}

/// Bounded connection retry used after launching a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Fixed delay before each attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Client for one connection to the recorder server.
pub struct RecorderClient<S> {
    stream: BufReader<S>,
}

impl<S> RecorderClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, request: &Request) -> Result<(), ClientError> {
        let line = request.encode();
        debug!("Sending {:?}", line);
        write_line(&mut self.stream, &line).await?;

        let reply = read_line(&mut self.stream).await?;
        debug!("Received {:?}", reply);
        match Response::decode(&reply)? {
            Response::Success => Ok(()),
            Response::Failure(detail) => Err(ClientError::Remote(detail)),
        }
    }

    pub async fn start(&mut self, options: StartOptions) -> Result<(), ClientError> {
        self.request(&Request::Start(options)).await
    }

    pub async fn stop(&mut self, destination: &str) -> Result<(), ClientError> {
        self.request(&Request::Stop {
            destination: destination.to_string(),
        })
        .await
    }

    pub async fn cancel(&mut self) -> Result<(), ClientError> {
        self.request(&Request::Cancel).await
    }

    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.request(&Request::Disconnect).await
    }

    pub async fn kill(&mut self) -> Result<(), ClientError> {
        self.request(&Request::Kill).await
    }
}

/// Stream type of a live control-channel connection.
#[cfg(unix)]
pub type ChannelStream = tokio::net::UnixStream;
#[cfg(windows)]
pub type ChannelStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Open one connection to the server listening at `path`.
pub async fn open_channel(path: &Path) -> std::io::Result<ChannelStream> {
    #[cfg(unix)]
    {
        tokio::net::UnixStream::connect(path).await
    }

    #[cfg(windows)]
    {
        tokio::net::windows::named_pipe::ClientOptions::new().open(path)
    }
}

/// Try to reach a server once.
pub async fn connect(path: &Path) -> Result<RecorderClient<ChannelStream>, ClientError> {
    open_channel(path)
        .await
        .map(RecorderClient::new)
        .map_err(|e| ClientError::ConnectionFailed {
            attempts: 1,
            reason: e.to_string(),
        })
}

/// Call `connect` up to `policy.attempts` times, sleeping `policy.backoff`
/// before each attempt.
pub async fn connect_with_retry<F, Fut, S>(
    mut connect: F,
    policy: RetryPolicy,
) -> Result<RecorderClient<S>, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<S>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut last_error = String::from("no attempts made");
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.backoff).await;
        match connect().await {
            Ok(stream) => {
                debug!("Connected on attempt {}", attempt);
                return Ok(RecorderClient::new(stream));
            }
            Err(e) => {
                debug!("Connect attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
            }
        }
    }

    Err(ClientError::ConnectionFailed {
        attempts: policy.attempts,
        reason: last_error,
    })
}

/// Spawns a detached recorder server.
pub trait ProcessLauncher {
    fn launch(&self) -> Result<(), ClientError>;
}

/// Launches this executable in the `newserver` role.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfLauncher;

impl ProcessLauncher for SelfLauncher {
    fn launch(&self) -> Result<(), ClientError> {
        let exe = std::env::current_exe().map_err(|e| ClientError::SpawnFailed(e.to_string()))?;

        let mut command = Command::new(&exe);
        command
            .arg("newserver")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Leave the terminal's process group so Ctrl+C in the shell spares the server
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = command
            .spawn()
            .map_err(|e| ClientError::SpawnFailed(format!("{}: {}", exe.display(), e)))?;
        info!("Launched recorder server (pid: {})", child.id());
        Ok(())
    }
}

/// A connection obtained by [`connect_or_spawn_with`].
pub enum Connection<S> {
    /// A server was already running
    Existing(RecorderClient<S>),
    /// A server was launched for this invocation
    Spawned(RecorderClient<S>),
}

/// Reach a server, launching one if nothing answers the first probe.
pub async fn connect_or_spawn_with<F, Fut, S>(
    mut connect: F,
    launcher: &dyn ProcessLauncher,
    policy: RetryPolicy,
) -> Result<Connection<S>, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<S>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Ok(stream) = connect().await {
        return Ok(Connection::Existing(RecorderClient::new(stream)));
    }

    launcher.launch()?;
    connect_with_retry(connect, policy)
        .await
        .map(Connection::Spawned)
}

/// [`connect_or_spawn_with`] against the channel at `path`.
pub async fn connect_or_spawn(
    path: &Path,
    launcher: &dyn ProcessLauncher,
    policy: RetryPolicy,
) -> Result<Connection<ChannelStream>, ClientError> {
    connect_or_spawn_with(|| open_channel(path), launcher, policy).await
}
