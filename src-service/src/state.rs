//! Recorder state for the server.
//!
//! Holds at most one active [`CaptureSession`] and enforces the lifecycle
//! rules: start only while idle, stop/cancel only while recording.

use std::path::Path;
use std::sync::Arc;

use screenrec_common::ipc::StartOptions;
use screenrec_common::paths::{resolve_destination, PathError};
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{
    CaptureBackend, CaptureError, CaptureSession, EnumerationError, FlushOutcome, ImageEncoder,
    MonitorInfo, RetentionLimit, SessionError,
};

/// Errors returned for requests that cannot run in the current state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("recording already started")]
    AlreadyStarted,
    #[error("recording not started")]
    NotStarted,
    #[error("monitorIndex out of range ({available} monitors available)")]
    MonitorOutOfRange { index: usize, available: usize },
    #[error("the specified path is invalid: {0}")]
    InvalidDestination(#[from] PathError),
    #[error("failed to enumerate monitors: {0}")]
    Enumeration(#[from] EnumerationError),
    #[error("failed to open capture: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("flush task failed: {0}")]
    Worker(String),
}

/// Server-side recorder state.
pub struct RecorderState {
    backend: Arc<dyn CaptureBackend>,
    encoder: Arc<dyn ImageEncoder>,
    active: Option<Arc<CaptureSession>>,
}

impl RecorderState {
    pub fn new(backend: Arc<dyn CaptureBackend>, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            backend,
            encoder,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn list_monitors(&self) -> Result<Vec<MonitorInfo>, StateError> {
        Ok(self.backend.list_monitors()?)
    }

    /// Begin capturing the requested monitor.
    pub fn start(&mut self, options: StartOptions) -> Result<(), StateError> {
        if self.active.is_some() {
            return Err(StateError::AlreadyStarted);
        }

        let monitors = self.backend.list_monitors()?;
        let monitor = monitors
            .get(options.monitor_index)
            .ok_or(StateError::MonitorOutOfRange {
                index: options.monitor_index,
                available: monitors.len(),
            })?;

        let limit = RetentionLimit::from_request(options.buffer_capacity, options.size_budget);
        let feed = self.backend.open_feed(monitor)?;
        let session = CaptureSession::new(feed, options.frame_rate, limit);
        session.start()?;

        info!(
            "Recording monitor {} ({}, {}x{}) at {} fps, limit {:?}",
            monitor.index, monitor.name, monitor.width, monitor.height, options.frame_rate, limit
        );
        self.active = Some(Arc::new(session));
        Ok(())
    }

    /// Flush the active session into `destination` and end it.
    ///
    /// An unusable destination leaves the session recording. Returns the
    /// number of frames written.
    pub async fn stop(&mut self, destination: &str) -> Result<usize, StateError> {
        if self.active.is_none() {
            return Err(StateError::NotStarted);
        }
        let destination = resolve_destination(Path::new(destination))?;
        let Some(session) = self.active.take() else {
            return Err(StateError::NotStarted);
        };

        let encoder = Arc::clone(&self.encoder);
        let outcome = tokio::task::spawn_blocking(move || {
            session.close_and_flush(&destination, encoder.as_ref())
        })
        .await
        .map_err(|e| StateError::Worker(e.to_string()))??;

        match outcome {
            FlushOutcome::Flushed { frames } => Ok(frames),
            FlushOutcome::AlreadyClosed => {
                warn!("Session was already closed, nothing flushed");
                Ok(0)
            }
        }
    }

    /// Discard the active session.
    pub fn cancel(&mut self) -> Result<(), StateError> {
        let session = self.active.take().ok_or(StateError::NotStarted)?;
        session.close();
        Ok(())
    }

    /// Cancel any active session during server teardown.
    pub fn shutdown(&mut self) {
        if self.active.is_some() {
            info!("Cancelling active recording before shutdown...");
            let _ = self.cancel();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::session::tests::{FakeFeedHandle, RecordingEncoder};
    use crate::capture::{CaptureFeed, JpegEncoder, MonitorEnumerator};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Backend exposing `monitors` fake monitors that all share one feed handle.
    pub(crate) struct FakeBackend {
        pub(crate) monitors: usize,
        pub(crate) handle: FakeFeedHandle,
    }

    impl MonitorEnumerator for FakeBackend {
        fn list_monitors(&self) -> Result<Vec<MonitorInfo>, EnumerationError> {
            Ok((0..self.monitors)
                .map(|index| MonitorInfo {
                    index,
                    id: format!("fake-{index}"),
                    name: format!("Fake {index}"),
                    width: 2,
                    height: 2,
                    is_primary: index == 0,
                })
                .collect())
        }
    }

    impl CaptureBackend for FakeBackend {
        fn open_feed(&self, _monitor: &MonitorInfo) -> Result<Box<dyn CaptureFeed>, CaptureError> {
            Ok(self.handle.feed())
        }
    }

    pub(crate) fn fake_state(monitors: usize) -> (RecorderState, FakeFeedHandle) {
        let handle = FakeFeedHandle::default();
        let backend = FakeBackend {
            monitors,
            handle: handle.clone(),
        };
        let state = RecorderState::new(Arc::new(backend), Arc::new(JpegEncoder::default()));
        (state, handle)
    }

    fn options(frame_rate: u32, monitor_index: usize) -> StartOptions {
        StartOptions {
            frame_rate,
            buffer_capacity: 3,
            monitor_index,
            size_budget: false,
        }
    }

    #[test]
    fn test_start_rejects_second_session() {
        let (mut state, handle) = fake_state(1);
        state.start(options(1, 0)).unwrap();
        assert!(state.is_recording());
        assert!(matches!(state.start(options(1, 0)), Err(StateError::AlreadyStarted)));
        assert_eq!(handle.subscribes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_validates_monitor_index() {
        let (mut state, _) = fake_state(2);
        let err = state.start(options(1, 2)).unwrap_err();
        assert!(matches!(
            err,
            StateError::MonitorOutOfRange {
                index: 2,
                available: 2
            }
        ));
        assert!(err.to_string().starts_with("monitorIndex out of range"));
        assert!(!state.is_recording());
    }

    #[test]
    fn test_cancel_requires_session() {
        let (mut state, handle) = fake_state(1);
        assert!(matches!(state.cancel(), Err(StateError::NotStarted)));

        state.start(options(1, 0)).unwrap();
        state.cancel().unwrap();
        assert!(!state.is_recording());
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_requires_session() {
        let (mut state, _) = fake_state(1);
        let err = state.stop("/tmp").await.unwrap_err();
        assert_eq!(err.to_string(), "recording not started");
    }

    #[tokio::test]
    async fn test_stop_with_bad_path_keeps_recording() {
        let (mut state, handle) = fake_state(1);
        state.start(options(1, 0)).unwrap();

        let err = state.stop("relative/dir").await.unwrap_err();
        assert!(matches!(err, StateError::InvalidDestination(_)));
        assert!(state.is_recording());
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_flushes_frames_to_disk() {
        let (mut state, handle) = fake_state(1);
        state.start(options(1000, 0)).unwrap();

        for tag in 1..=5u8 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(handle.deliver(2, 2, tag));
        }

        let dir = tempfile::tempdir().unwrap();
        let frames = state.stop(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(frames, 3);
        assert!(!state.is_recording());
        for i in 1..=3 {
            assert!(dir.path().join(format!("screenshot{:04}.jpg", i)).is_file());
        }
        assert!(!dir.path().join("screenshot0004.jpg").exists());
    }

    #[tokio::test]
    async fn test_flush_failure_ends_session() {
        let handle = FakeFeedHandle::default();
        let backend = FakeBackend {
            monitors: 1,
            handle: handle.clone(),
        };
        let encoder = RecordingEncoder {
            fail_at: Some(0),
            ..Default::default()
        };
        let mut state = RecorderState::new(Arc::new(backend), Arc::new(encoder));
        state.start(options(1000, 0)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(handle.deliver(2, 2, 1));

        let dir = tempfile::tempdir().unwrap();
        let err = state.stop(dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, StateError::Session(SessionError::Encode(_))));
        assert!(!state.is_recording());
    }
}
