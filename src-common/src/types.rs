//! Shared types used by the server and its clients.

use serde::{Deserialize, Serialize};

/// A capture target as enumerated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    /// Position in the enumeration order, used by `start`
    pub index: usize,
    /// Unique identifier (platform-specific)
    pub id: String,
    /// Display name
    pub name: String,
    /// Width in pixels (physical)
    pub width: u32,
    /// Height in pixels (physical)
    pub height: u32,
    /// Whether this is the primary monitor
    pub is_primary: bool,
}
