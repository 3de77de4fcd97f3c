//! screenrec command-line interface
//!
//! Short-lived client commands for the background recorder, plus the hidden
//! `newserver` role that runs the recorder itself.

mod client;
mod colors;
mod commands;

use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use screenrec_common::ipc::StartOptions;
use screenrec_common::logging::{ensure_log_dir, SERVER_LOG_PREFIX};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::EnvFilter;

/// screenrec - rolling screen capture recorder
#[derive(Parser, Debug)]
#[command(name = "screenrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start recording in the background
    Start {
        /// Screenshots taken per second
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        framerate: u32,

        /// Screenshots kept in memory (megabytes with --mb)
        #[arg(long, default_value_t = 60)]
        framebuffer: usize,

        /// Treat --framebuffer as a memory budget in megabytes
        #[arg(long)]
        mb: bool,

        /// Monitor to record (see 'screenrec monitors')
        #[arg(long, default_value_t = 0)]
        monitor: usize,
    },
    /// Stop recording and save the buffered screenshots into a folder
    Stop {
        /// Destination folder; must already exist
        #[arg(allow_hyphen_values = true)]
        folder: String,
    },
    /// Stop recording and discard the buffered screenshots
    Cancel,
    /// List monitors that can be recorded
    Monitors {
        /// Output in JSON format for scripting
        #[arg(long)]
        json: bool,
    },
    /// Run the recorder server in the foreground
    #[command(hide = true)]
    Newserver,
}

/// Rewrite single-dash spellings (`-start`, `-framerate 5`) to the clap form.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    const SUBCOMMANDS: &[&str] = &["start", "stop", "cancel", "monitors", "newserver", "help"];
    const FLAGS: &[&str] = &["framerate", "framebuffer", "mb", "monitor", "json"];

    let mut normalized = Vec::new();
    let mut verbatim_next = false;
    for (position, arg) in args.into_iter().enumerate() {
        if position == 0 || verbatim_next {
            verbatim_next = false;
            normalized.push(arg);
            continue;
        }

        let rewritten = arg.to_str().and_then(|text| {
            let word = text.strip_prefix('-').filter(|w| !w.starts_with('-'))?;
            if SUBCOMMANDS.contains(&word) {
                Some(word.to_string())
            } else if FLAGS.contains(&word) {
                Some(format!("--{}", word))
            } else {
                None
            }
        });

        let is_stop = matches!(arg.to_str(), Some("stop" | "-stop"));
        normalized.push(rewritten.map(OsString::from).unwrap_or(arg));
        // The stop folder is taken as given
        verbatim_next = is_stop;
    }
    normalized
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Client roles log warnings to stderr; the server role logs to a daily file.
fn init_logging(server_role: bool) -> Option<WorkerGuard> {
    if server_role {
        let appender = ensure_log_dir()
            .map_err(|e| e.to_string())
            .and_then(|dir| {
                RollingBuilder::new()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(SERVER_LOG_PREFIX)
                    .filename_suffix("log")
                    .build(dir)
                    .map_err(|e| e.to_string())
            });

        match appender {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter("info"))
                    .with_writer(writer)
                    .with_ansi(false)
                    .init();
                return Some(guard);
            }
            Err(e) => eprintln!("Log file unavailable, logging to stderr: {}", e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(if server_role { "info" } else { "warn" }))
        .with_writer(std::io::stderr)
        .init();
    None
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    let _guard = init_logging(matches!(cli.command, Commands::Newserver));

    // Build the async runtime
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("{}", colors::error(&format!("Failed to create Tokio runtime: {}", e)));
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Start {
            framerate,
            framebuffer,
            mb,
            monitor,
        } => {
            commands::start(StartOptions {
                frame_rate: framerate,
                buffer_capacity: framebuffer,
                monitor_index: monitor,
                size_budget: mb,
            })
            .await
        }
        Commands::Stop { folder } => commands::stop(&folder).await,
        Commands::Cancel => commands::cancel().await,
        Commands::Monitors { json } => commands::monitors(json),
        Commands::Newserver => commands::newserver().await,
    }
}
