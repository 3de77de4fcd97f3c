//! Polling capture feed built on the `xcap` crate (Linux, macOS).
//!
//! xcap exposes one-shot screenshots only, so the feed grabs the monitor on a
//! dedicated thread at a fixed poll rate and hands each image to the sink.
//! The session decides which of those samples to keep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use xcap::Monitor;

use super::error::{CaptureError, EnumerationError};
use super::types::{PixelFormat, SurfaceView};
use super::{CaptureBackend, CaptureFeed, FrameSink, MonitorEnumerator, MonitorInfo};

/// Delay between screen grabs (~60 Hz).
const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Capture backend for platforms served by xcap.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapBackend;

impl MonitorEnumerator for XcapBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, EnumerationError> {
        let monitors =
            Monitor::all().map_err(|e| EnumerationError::PlatformError(e.to_string()))?;

        Ok(monitors
            .iter()
            .enumerate()
            .map(|(index, monitor)| MonitorInfo {
                index,
                id: monitor.id().map(|id| id.to_string()).unwrap_or_default(),
                name: monitor
                    .name()
                    .unwrap_or_else(|_| format!("Display {}", index + 1)),
                width: monitor.width().unwrap_or(0),
                height: monitor.height().unwrap_or(0),
                is_primary: monitor.is_primary().unwrap_or(false),
            })
            .collect())
    }
}

impl CaptureBackend for XcapBackend {
    fn open_feed(&self, monitor: &MonitorInfo) -> Result<Box<dyn CaptureFeed>, CaptureError> {
        Ok(Box::new(XcapFeed {
            monitor_index: monitor.index,
            worker: None,
        }))
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Feed polling a single monitor.
pub struct XcapFeed {
    monitor_index: usize,
    worker: Option<Worker>,
}

impl CaptureFeed for XcapFeed {
    fn subscribe(&mut self, mut sink: FrameSink) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::PlatformError("feed already subscribed".into()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let index = self.monitor_index;
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("screenrec-capture".into())
            .spawn(move || {
                let monitor = match Monitor::all() {
                    Ok(monitors) => monitors.into_iter().nth(index),
                    Err(e) => {
                        let _ = ready_tx.send(Err(CaptureError::PlatformError(e.to_string())));
                        return;
                    }
                };
                let Some(monitor) = monitor else {
                    let _ = ready_tx.send(Err(CaptureError::TargetNotFound(format!(
                        "monitor {}",
                        index
                    ))));
                    return;
                };
                let _ = ready_tx.send(Ok(()));

                while !thread_stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    match monitor.capture_image() {
                        Ok(image) => {
                            let view = SurfaceView::packed(
                                image.width(),
                                image.height(),
                                PixelFormat::Rgba8,
                                image.as_raw(),
                            );
                            sink(&view);
                        }
                        Err(e) => warn!("Screen grab failed: {}", e),
                    }
                    std::thread::sleep(POLL_INTERVAL.saturating_sub(started.elapsed()));
                }
                debug!("Capture thread for monitor {} exiting", index);
            })
            .map_err(|e| CaptureError::PlatformError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CaptureError::PlatformError("capture thread exited".into())));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::Release);
        worker
            .handle
            .join()
            .map_err(|_| CaptureError::PlatformError("capture thread panicked".into()))
    }
}

impl Drop for XcapFeed {
    fn drop(&mut self) {
        let _ = self.unsubscribe();
    }
}
