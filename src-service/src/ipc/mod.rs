//! Control-channel server for the recorder.

pub mod handlers;
pub mod server;

pub use handlers::Directive;
pub use server::{serve, ConnectionOutcome, RecorderServer, ServerError};
