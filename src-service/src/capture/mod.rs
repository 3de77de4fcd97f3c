//! Screen capture for the recorder server.
//!
//! This module provides platform-agnostic interfaces for monitor enumeration
//! and frame delivery, with platform-specific implementations selected at
//! compile time.

pub mod buffer;
pub mod encoder;
pub mod error;
pub mod session;
pub mod types;

#[cfg(not(windows))]
pub mod xcap_feed;
#[cfg(windows)]
pub mod windows;

pub use screenrec_common::MonitorInfo;

pub use buffer::{FrameRetentionBuffer, RetentionLimit};
pub use encoder::{frame_file_name, ImageEncoder, JpegEncoder};
pub use error::{CaptureError, EncodeError, EnumerationError, SessionError};
pub use session::{CaptureSession, FlushOutcome, FrameDisposition};
pub use types::{Frame, FrameImage, PixelFormat, SurfaceView};

// Platform-specific backend aliases
#[cfg(not(windows))]
pub use xcap_feed::XcapBackend as PlatformBackend;
#[cfg(windows)]
pub use self::windows::WindowsBackend as PlatformBackend;

/// Callback receiving every surface a feed delivers, on the feed's own thread.
pub type FrameSink = Box<dyn FnMut(&SurfaceView<'_>) + Send>;

/// A live source of surfaces for one capture target.
pub trait CaptureFeed: Send {
    /// Begin delivering surfaces to `sink`.
    fn subscribe(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Stop delivery. When this returns the sink will not be called again.
    fn unsubscribe(&mut self) -> Result<(), CaptureError>;
}

/// Trait for monitor/display enumeration operations.
pub trait MonitorEnumerator: Send + Sync {
    /// List all connected monitors in a stable order.
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, EnumerationError>;
}

/// Trait for opening capture feeds.
pub trait CaptureBackend: MonitorEnumerator {
    /// Open an unsubscribed feed for `monitor`.
    fn open_feed(&self, monitor: &MonitorInfo) -> Result<Box<dyn CaptureFeed>, CaptureError>;
}
