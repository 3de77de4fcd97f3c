//! screenrec common library
//!
//! Shared types, the line-oriented control-channel codec, and path helpers
//! used by both the recorder server and its command-line clients.

pub mod ipc;
pub mod logging;
pub mod paths;
pub mod types;

pub use types::*;
