//! CLI command implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use screenrec_common::ipc::{channel_path, StartOptions};
use screenrec_service::capture::{MonitorEnumerator, PlatformBackend};
use screenrec_service::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info};

use crate::client::{self, ClientError, Connection, RecorderClient, RetryPolicy, SelfLauncher};
use crate::colors;

pub const START_USAGE: &str = "Usage: screenrec start [--framerate <fps>] [--framebuffer <count> [--mb]] [--monitor <index>]";
pub const STOP_USAGE: &str = "Usage: screenrec stop <folder>";
pub const CANCEL_USAGE: &str = "Usage: screenrec cancel";

const ALREADY_RECORDING: &str = "There is already a recording in process.";
const NOT_RECORDING: &str = "There is no recording in process.";

/// Start a recording, launching the recorder server.
pub async fn start(options: StartOptions) -> ExitCode {
    let connection = match client::connect_or_spawn(
        &channel_path(),
        &SelfLauncher,
        RetryPolicy::default(),
    )
    .await
    {
        Ok(connection) => connection,
        Err(e) => {
            report_failure(&e, START_USAGE);
            return ExitCode::FAILURE;
        }
    };

    run_start(connection, options).await
}

pub(crate) async fn run_start<S>(connection: Connection<S>, options: StartOptions) -> ExitCode
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = match connection {
        Connection::Existing(mut client) => {
            println!("{}", ALREADY_RECORDING);
            release(&mut client).await;
            return ExitCode::FAILURE;
        }
        Connection::Spawned(client) => client,
    };

    match client.start(options).await {
        Ok(()) => {
            println!(
                "{} {} fps, buffer {}{}, monitor {}",
                colors::success("Recording started:"),
                colors::number(&options.frame_rate.to_string()),
                colors::number(&options.buffer_capacity.to_string()),
                if options.size_budget { " MB" } else { " frames" },
                colors::number(&options.monitor_index.to_string())
            );
            release(&mut client).await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e, START_USAGE);
            // The server was launched for this request only
            terminate(&mut client).await;
            ExitCode::FAILURE
        }
    }
}

/// Save the retained frames into `folder` and end the recording.
pub async fn stop(folder: &str) -> ExitCode {
    let destination = match normalize_folder(folder) {
        Ok(path) => path,
        Err(e) => {
            println!("{}", colors::error(&e));
            println!("{}", STOP_USAGE);
            return ExitCode::FAILURE;
        }
    };

    let Some(client) = connect_existing().await else {
        return ExitCode::FAILURE;
    };
    run_stop(client, &destination).await
}

pub(crate) async fn run_stop<S>(mut client: RecorderClient<S>, destination: &Path) -> ExitCode
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match client.stop(&destination.to_string_lossy()).await {
        Ok(()) => {
            println!(
                "{} {}",
                colors::success("Recording saved to"),
                colors::path(&destination.display().to_string())
            );
            terminate(&mut client).await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e, STOP_USAGE);
            release(&mut client).await;
            ExitCode::FAILURE
        }
    }
}

/// Discard the recording.
pub async fn cancel() -> ExitCode {
    let Some(client) = connect_existing().await else {
        return ExitCode::FAILURE;
    };
    run_cancel(client).await
}

pub(crate) async fn run_cancel<S>(mut client: RecorderClient<S>) -> ExitCode
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match client.cancel().await {
        Ok(()) => {
            println!("{}", colors::success("Recording cancelled."));
            terminate(&mut client).await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e, CANCEL_USAGE);
            release(&mut client).await;
            ExitCode::FAILURE
        }
    }
}

/// List capture targets and their indices.
pub fn monitors(json: bool) -> ExitCode {
    let monitors = match PlatformBackend.list_monitors() {
        Ok(monitors) => monitors,
        Err(e) => {
            println!("{}", colors::error(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    if json {
        return match serde_json::to_string_pretty(&monitors) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", colors::error(&e.to_string()));
                ExitCode::FAILURE
            }
        };
    }

    if monitors.is_empty() {
        println!("{}", colors::dim("No monitors found."));
        return ExitCode::SUCCESS;
    }

    let name_width = monitors
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{}  {}  {}",
        colors::pad_left("INDEX", 5, colors::header),
        colors::pad_left("NAME", name_width, colors::header),
        colors::header("RESOLUTION")
    );
    for monitor in &monitors {
        let primary = if monitor.is_primary { " (primary)" } else { "" };
        println!(
            "{}  {:<name_width$}  {}x{}{}",
            colors::pad_left(&monitor.index.to_string(), 5, colors::number),
            monitor.name,
            monitor.width,
            monitor.height,
            colors::dim(primary)
        );
    }
    ExitCode::SUCCESS
}

/// Run the recorder server in this process.
pub async fn newserver() -> ExitCode {
    let config = ServerConfig::default();

    // A second server would fail to bind; hand the probe connection back instead
    if let Ok(mut client) = client::connect(&config.channel_path).await {
        info!("A recorder server is already running, exiting");
        release(&mut client).await;
        return ExitCode::SUCCESS;
    }

    match screenrec_service::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Recorder server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Expand `~` and make `folder` absolute against the working directory.
pub fn normalize_folder(folder: &str) -> Result<PathBuf, String> {
    let expanded = shellexpand::tilde(folder);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| format!("cannot resolve {}: {}", folder, e))
}

async fn connect_existing() -> Option<RecorderClient<client::ChannelStream>> {
    match client::connect(&channel_path()).await {
        Ok(client) => Some(client),
        Err(e) => {
            info!("No recorder server reachable: {}", e);
            println!("{}", NOT_RECORDING);
            None
        }
    }
}

fn report_failure(e: &ClientError, usage: &str) {
    println!("{}", failure_message(e, usage));
}

/// Diagnostic plus command usage, printed on every failed request.
fn failure_message(e: &ClientError, usage: &str) -> String {
    format!("{}\n{}", colors::error(&e.to_string()), usage)
}

/// Best-effort disconnect; the server keeps running.
async fn release<S>(client: &mut RecorderClient<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = client.disconnect().await {
        println!(
            "{}",
            colors::error(&format!("Failed to communicate with the recorder: {}", e))
        );
    }
}

/// Best-effort kill; the server exits.
async fn terminate<S>(client: &mut RecorderClient<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = client.kill().await {
        println!(
            "{}",
            colors::error(&format!("Failed to communicate with the recorder: {}", e))
        );
    }
}
