//! Monitor capture using Windows.Graphics.Capture API via windows-capture crate.

use tracing::debug;
use windows_capture::{
    capture::{CaptureControl, Context, GraphicsCaptureApiHandler},
    frame::Frame,
    graphics_capture_api::InternalCaptureControl,
    monitor::Monitor,
    settings::{
        ColorFormat, CursorCaptureSettings, DirtyRegionSettings, DrawBorderSettings,
        MinimumUpdateIntervalSettings, SecondaryWindowSettings, Settings,
    },
};

use super::error::{CaptureError, EnumerationError};
use super::types::{PixelFormat, SurfaceView};
use super::{CaptureBackend, CaptureFeed, FrameSink, MonitorEnumerator, MonitorInfo};

type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Frame handler forwarding each delivered buffer to the session sink.
pub struct FeedHandler {
    sink: FrameSink,
}

impl GraphicsCaptureApiHandler for FeedHandler {
    type Flags = FrameSink;
    type Error = HandlerError;

    fn new(ctx: Context<Self::Flags>) -> Result<Self, Self::Error> {
        Ok(Self { sink: ctx.flags })
    }

    fn on_frame_arrived(
        &mut self,
        frame: &mut Frame,
        _capture_control: InternalCaptureControl,
    ) -> Result<(), Self::Error> {
        let mut buffer = frame.buffer()?;
        let width = buffer.width();
        let height = buffer.height();
        let raw_data = buffer.as_raw_buffer();

        // Rows may carry padding for GPU alignment
        let stride = match height {
            0 => 0,
            h => raw_data.len() / h as usize,
        };

        let view = SurfaceView {
            width,
            height,
            format: PixelFormat::Bgra8,
            stride,
            pixels: raw_data,
        };
        (self.sink)(&view);

        Ok(())
    }

    fn on_closed(&mut self) -> Result<(), Self::Error> {
        debug!("Capture item closed");
        Ok(())
    }
}

fn monitors() -> Result<Vec<Monitor>, EnumerationError> {
    Monitor::enumerate().map_err(|e| EnumerationError::PlatformError(e.to_string()))
}

/// Capture backend for Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl MonitorEnumerator for WindowsBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, EnumerationError> {
        let primary = Monitor::primary().ok().map(|m| m.as_raw_hmonitor());

        Ok(monitors()?
            .iter()
            .enumerate()
            .map(|(index, monitor)| MonitorInfo {
                index,
                id: monitor.device_name().unwrap_or_default(),
                name: monitor
                    .name()
                    .unwrap_or_else(|_| format!("Display {}", index + 1)),
                width: monitor.width().unwrap_or(0),
                height: monitor.height().unwrap_or(0),
                is_primary: Some(monitor.as_raw_hmonitor()) == primary,
            })
            .collect())
    }
}

impl CaptureBackend for WindowsBackend {
    fn open_feed(&self, monitor: &MonitorInfo) -> Result<Box<dyn CaptureFeed>, CaptureError> {
        Ok(Box::new(WindowsFeed {
            monitor_index: monitor.index,
            control: None,
        }))
    }
}

/// Free-threaded capture of a single monitor.
pub struct WindowsFeed {
    monitor_index: usize,
    control: Option<CaptureControl<FeedHandler, HandlerError>>,
}

impl CaptureFeed for WindowsFeed {
    fn subscribe(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.control.is_some() {
            return Err(CaptureError::PlatformError("feed already subscribed".into()));
        }

        let monitor = monitors()
            .map_err(|e| CaptureError::PlatformError(e.to_string()))?
            .into_iter()
            .nth(self.monitor_index)
            .ok_or_else(|| CaptureError::TargetNotFound(format!("monitor {}", self.monitor_index)))?;

        let settings = Settings::new(
            monitor,
            CursorCaptureSettings::WithCursor,
            DrawBorderSettings::WithoutBorder,
            SecondaryWindowSettings::Default,
            MinimumUpdateIntervalSettings::Default,
            DirtyRegionSettings::Default,
            ColorFormat::Bgra8,
            sink,
        );

        let control = FeedHandler::start_free_threaded(settings)
            .map_err(|e| CaptureError::PlatformError(e.to_string()))?;
        self.control = Some(control);
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), CaptureError> {
        match self.control.take() {
            Some(control) => control
                .stop()
                .map_err(|e| CaptureError::PlatformError(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for WindowsFeed {
    fn drop(&mut self) {
        let _ = self.unsubscribe();
    }
}
