//! Control request handlers.
//!
//! This module maps each decoded request onto the recorder state and decides
//! what happens to the connection afterwards.

use screenrec_common::ipc::{Request, Response};
use tracing::{debug, error, info, warn};

use crate::state::RecorderState;

/// What the connection loop does after sending the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Read the next request
    Continue,
    /// Close this connection and wait for the next client
    Disconnect,
    /// Close this connection and stop the server
    Shutdown,
}

/// Handle a control request and return the response plus follow-up.
pub async fn handle_request(state: &mut RecorderState, request: Request) -> (Response, Directive) {
    debug!("Handling request: {:?}", request);

    match request {
        Request::Start(options) => {
            info!(
                "Start: {} fps, capacity {}{}, monitor {}",
                options.frame_rate,
                options.buffer_capacity,
                if options.size_budget { " MB" } else { " frames" },
                options.monitor_index
            );
            match state.start(options) {
                Ok(()) => (Response::ok(), Directive::Continue),
                Err(e) => {
                    warn!("Failed to start recording: {}", e);
                    (Response::error(e.to_string()), Directive::Continue)
                }
            }
        }
        Request::Stop { destination } => {
            info!("Stop: saving to {}", destination);
            match state.stop(&destination).await {
                Ok(frames) => {
                    info!("Saved {} frames to {}", frames, destination);
                    (Response::ok(), Directive::Continue)
                }
                Err(e) => {
                    error!("Failed to stop recording: {}", e);
                    (Response::error(e.to_string()), Directive::Continue)
                }
            }
        }
        Request::Cancel => {
            info!("Cancel");
            match state.cancel() {
                Ok(()) => (Response::ok(), Directive::Continue),
                Err(e) => {
                    warn!("Failed to cancel recording: {}", e);
                    (Response::error(e.to_string()), Directive::Continue)
                }
            }
        }
        Request::Disconnect => {
            info!("Disconnect requested");
            (Response::ok(), Directive::Disconnect)
        }
        Request::Kill => {
            info!("Kill requested");
            (Response::ok(), Directive::Shutdown)
        }
    }
}
