//! Rate-limited capture session with single-shot teardown.
//!
//! The feed calls [`CaptureSession::on_frame_arrived`] on its own thread while
//! control requests call [`CaptureSession::close`] or
//! [`CaptureSession::close_and_flush`]. The two sides share only the lifecycle
//! flag and the retention buffer. Teardown claims the flag with a
//! compare-and-swap, unsubscribes the feed synchronously, and only then
//! touches the buffer for flushing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::buffer::{FrameRetentionBuffer, RetentionLimit};
use super::encoder::{frame_file_name, ImageEncoder};
use super::error::SessionError;
use super::types::{Frame, FrameImage, SurfaceView};
use super::CaptureFeed;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// What happened to a delivered surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Copied into the retention buffer
    Stored,
    /// Arrived before the sampling interval elapsed
    Throttled,
    /// Could not be copied
    Rejected,
    /// The retention limit keeps no frames
    Discarded,
    /// Session is no longer open
    Closed,
}

/// Result of [`CaptureSession::close_and_flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This call tore the session down and wrote `frames` images
    Flushed { frames: usize },
    /// Another teardown already ran; nothing was written
    AlreadyClosed,
}

struct Ingest {
    last_sample: Option<Instant>,
    buffer: FrameRetentionBuffer,
}

/// State reachable from the feed's delivery thread.
struct SessionCore {
    state: AtomicU8,
    interval: Duration,
    ingest: Mutex<Ingest>,
    received: AtomicU64,
    stored: AtomicU64,
}

impl SessionCore {
    fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    fn on_frame_arrived(&self, surface: &SurfaceView<'_>, now: Instant) -> FrameDisposition {
        if !self.is_open() {
            return FrameDisposition::Closed;
        }
        self.received.fetch_add(1, Ordering::Relaxed);

        let mut ingest = self.ingest.lock();
        if let Some(last) = ingest.last_sample {
            if now.saturating_duration_since(last) < self.interval {
                return FrameDisposition::Throttled;
            }
        }

        if ingest.buffer.retains_nothing() {
            return FrameDisposition::Discarded;
        }

        // The feed reuses `surface` once we return; copy before admitting
        let image = match FrameImage::copy_from(surface) {
            Ok(image) => image,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return FrameDisposition::Rejected;
            }
        };
        let Some(evicted) = ingest.buffer.insert(Frame::new(image)) else {
            return FrameDisposition::Discarded;
        };
        ingest.last_sample = Some(now);
        self.stored.fetch_add(1, Ordering::Relaxed);

        trace!(
            "Stored {}x{} frame ({} evicted, {} retained, {} bytes)",
            surface.width,
            surface.height,
            evicted,
            ingest.buffer.len(),
            ingest.buffer.total_bytes()
        );
        FrameDisposition::Stored
    }

    fn claim_teardown(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish_teardown(&self) {
        self.ingest.lock().buffer.clear();
        self.state.store(CLOSED, Ordering::Release);
        info!(
            "Capture session closed ({} frames received, {} stored)",
            self.received.load(Ordering::Relaxed),
            self.stored.load(Ordering::Relaxed)
        );
    }
}

/// One recording: a subscribed feed sampled into a retention buffer.
pub struct CaptureSession {
    core: Arc<SessionCore>,
    feed: Mutex<Option<Box<dyn CaptureFeed>>>,
    started: AtomicBool,
}

impl CaptureSession {
    /// Create an open, not yet started session.
    ///
    /// `frame_rate` of 0 is treated as 1.
    pub fn new(feed: Box<dyn CaptureFeed>, frame_rate: u32, limit: RetentionLimit) -> Self {
        let interval = Duration::from_secs(1) / frame_rate.max(1);
        Self {
            core: Arc::new(SessionCore {
                state: AtomicU8::new(OPEN),
                interval,
                ingest: Mutex::new(Ingest {
                    last_sample: None,
                    buffer: FrameRetentionBuffer::new(limit),
                }),
                received: AtomicU64::new(0),
                stored: AtomicU64::new(0),
            }),
            feed: Mutex::new(Some(feed)),
            started: AtomicBool::new(false),
        }
    }

    /// Record the sampling baseline and subscribe to the feed.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut guard = self.feed.lock();
        let feed = match guard.as_mut() {
            Some(feed) if self.core.is_open() => feed,
            _ => return Err(SessionError::Closed),
        };
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }

        self.core.ingest.lock().last_sample = Some(Instant::now());

        let core = Arc::clone(&self.core);
        feed.subscribe(Box::new(move |surface| {
            core.on_frame_arrived(surface, Instant::now());
        }))?;

        debug!("Capture session started (interval {:?})", self.core.interval);
        Ok(())
    }

    /// Sample `surface` if the interval since the last stored frame has elapsed.
    pub fn on_frame_arrived(&self, surface: &SurfaceView<'_>) -> FrameDisposition {
        self.core.on_frame_arrived(surface, Instant::now())
    }

    /// [`Self::on_frame_arrived`] with an explicit arrival time.
    pub fn on_frame_arrived_at(&self, surface: &SurfaceView<'_>, now: Instant) -> FrameDisposition {
        self.core.on_frame_arrived(surface, now)
    }

    /// Stop capturing and discard retained frames.
    ///
    /// Returns `false` if the session was already torn down.
    pub fn close(&self) -> bool {
        if !self.core.claim_teardown() {
            return false;
        }

        let feed = self.feed.lock().take();
        if let Some(mut feed) = feed {
            if let Err(e) = feed.unsubscribe() {
                warn!("Failed to unsubscribe capture feed: {}", e);
            }
        }
        self.core.finish_teardown();
        true
    }

    /// Stop capturing and write every retained frame into `destination`.
    ///
    /// Frames are written oldest first as `screenshot0001.<ext>`, and so on.
    /// The first failed write aborts the rest. The session ends closed either
    /// way.
    pub fn close_and_flush(
        &self,
        destination: &Path,
        encoder: &dyn ImageEncoder,
    ) -> Result<FlushOutcome, SessionError> {
        if !self.core.claim_teardown() {
            debug!("Flush skipped, session already closed");
            return Ok(FlushOutcome::AlreadyClosed);
        }

        let mut feed = self.feed.lock().take();
        let result = self.flush(feed.as_mut(), destination, encoder);
        drop(feed);
        self.core.finish_teardown();

        result.map(|frames| FlushOutcome::Flushed { frames })
    }

    fn flush(
        &self,
        feed: Option<&mut Box<dyn CaptureFeed>>,
        destination: &Path,
        encoder: &dyn ImageEncoder,
    ) -> Result<usize, SessionError> {
        if let Some(feed) = feed {
            feed.unsubscribe()?;
        }

        let ingest = self.core.ingest.lock();
        let total = ingest.buffer.len();
        info!("Flushing {} frames to {}", total, destination.display());

        for (i, frame) in ingest.buffer.drain_in_order().enumerate() {
            let path = destination.join(frame_file_name(i + 1, encoder.extension()));
            encoder.encode(&frame.image, &path)?;
        }
        Ok(total)
    }

    pub fn is_closed(&self) -> bool {
        !self.core.is_open()
    }

    pub fn interval(&self) -> Duration {
        self.core.interval
    }

    /// Frames currently retained.
    pub fn retained(&self) -> usize {
        self.core.ingest.lock().buffer.len()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::error::{CaptureError, EncodeError};
    use crate::capture::types::PixelFormat;
    use crate::capture::FrameSink;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    /// Feed whose surfaces are pushed by the test through [`FakeFeedHandle`].
    pub(crate) struct FakeFeed {
        handle: FakeFeedHandle,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeFeedHandle {
        sink: Arc<StdMutex<Option<FrameSink>>>,
        pub(crate) subscribes: Arc<AtomicUsize>,
        pub(crate) unsubscribes: Arc<AtomicUsize>,
    }

    impl FakeFeedHandle {
        pub(crate) fn feed(&self) -> Box<dyn CaptureFeed> {
            Box::new(FakeFeed {
                handle: self.clone(),
            })
        }

        /// Deliver a packed BGRA surface filled with `tag`. Returns false when unsubscribed.
        pub(crate) fn deliver(&self, width: u32, height: u32, tag: u8) -> bool {
            let pixels = vec![tag; (width * height * 4) as usize];
            let view = SurfaceView::packed(width, height, PixelFormat::Bgra8, &pixels);
            match self.sink.lock().unwrap().as_mut() {
                Some(sink) => {
                    sink(&view);
                    true
                }
                None => false,
            }
        }
    }

    impl CaptureFeed for FakeFeed {
        fn subscribe(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
            self.handle.subscribes.fetch_add(1, Ordering::SeqCst);
            *self.handle.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn unsubscribe(&mut self) -> Result<(), CaptureError> {
            self.handle.unsubscribes.fetch_add(1, Ordering::SeqCst);
            *self.handle.sink.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Encoder that records the files it was asked to write.
    #[derive(Default)]
    pub(crate) struct RecordingEncoder {
        pub(crate) written: StdMutex<Vec<(String, u8)>>,
        pub(crate) fail_at: Option<usize>,
    }

    impl ImageEncoder for RecordingEncoder {
        fn extension(&self) -> &'static str {
            "jpg"
        }

        fn encode(&self, image: &FrameImage, path: &Path) -> Result<(), EncodeError> {
            let mut written = self.written.lock().unwrap();
            if self.fail_at == Some(written.len()) {
                return Err(EncodeError::InvalidImage("disk full".into()));
            }
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            written.push((name, image.pixels()[0]));
            Ok(())
        }
    }

    fn surface(pixels: &[u8]) -> SurfaceView<'_> {
        SurfaceView::packed(2, 2, PixelFormat::Bgra8, pixels)
    }

    #[test]
    fn test_throttles_to_interval() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 10, RetentionLimit::Frames(10));
        assert_eq!(session.interval(), Duration::from_millis(100));

        let pixels = vec![1u8; 16];
        let base = Instant::now();
        let at = |ms| base + Duration::from_millis(ms);

        // First frame after creation has no baseline
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(0)), FrameDisposition::Stored);
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(50)), FrameDisposition::Throttled);
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(99)), FrameDisposition::Throttled);
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(100)), FrameDisposition::Stored);
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(250)), FrameDisposition::Stored);
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at(300)), FrameDisposition::Throttled);
        assert_eq!(session.retained(), 3);
    }

    #[test]
    fn test_start_sets_baseline_and_subscribes() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(3));
        session.start().unwrap();
        assert_eq!(handle.subscribes.load(Ordering::SeqCst), 1);

        // Within one second of start: throttled
        assert!(handle.deliver(2, 2, 1));
        assert_eq!(session.retained(), 0);

        let later = Instant::now() + Duration::from_secs(2);
        let pixels = vec![2u8; 16];
        assert_eq!(session.on_frame_arrived_at(&surface(&pixels), later), FrameDisposition::Stored);
        assert_eq!(session.retained(), 1);
    }

    #[test]
    fn test_start_twice_fails() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(3));
        session.start().unwrap();
        assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));
    }

    #[test]
    fn test_start_after_close_fails() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(3));
        assert!(session.close());
        assert!(matches!(session.start(), Err(SessionError::Closed)));
        assert_eq!(handle.subscribes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_runs_once() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 30, RetentionLimit::Frames(3));
        session.start().unwrap();

        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
        assert!(!handle.deliver(2, 2, 1));

        let pixels = vec![0u8; 16];
        assert_eq!(session.on_frame_arrived(&surface(&pixels)), FrameDisposition::Closed);
    }

    #[test]
    fn test_concurrent_close_runs_once() {
        let handle = FakeFeedHandle::default();
        let session = Arc::new(CaptureSession::new(handle.feed(), 30, RetentionLimit::Frames(3)));
        session.start().unwrap();

        let winners: usize = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.close())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_capacity_discards_without_storing() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(0));
        let pixels = vec![1u8; 16];

        assert_eq!(session.on_frame_arrived(&surface(&pixels)), FrameDisposition::Discarded);
        assert_eq!(session.retained(), 0);
        assert_eq!(session.core.stored.load(Ordering::Relaxed), 0);
        assert_eq!(session.core.received.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_flush_races_close_once() {
        for _ in 0..20 {
            let handle = FakeFeedHandle::default();
            let session =
                Arc::new(CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(5)));
            session.start().unwrap();
            let base = Instant::now() + Duration::from_secs(2);
            for i in 0..3u64 {
                let pixels = vec![i as u8; 16];
                session.on_frame_arrived_at(&surface(&pixels), base + Duration::from_secs(i * 2));
            }
            assert_eq!(session.retained(), 3);

            let encoder = Arc::new(RecordingEncoder::default());
            let barrier = Arc::new(std::sync::Barrier::new(6));
            let threads: Vec<_> = (0..6)
                .map(|i| {
                    let session = Arc::clone(&session);
                    let encoder = Arc::clone(&encoder);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        if i % 2 == 0 {
                            session.close()
                        } else {
                            let outcome = session
                                .close_and_flush(Path::new("/tmp"), encoder.as_ref())
                                .unwrap();
                            matches!(outcome, FlushOutcome::Flushed { .. })
                        }
                    })
                })
                .collect();
            let winners: usize = threads
                .into_iter()
                .map(|t| t.join().unwrap() as usize)
                .sum();

            assert_eq!(winners, 1);
            assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
            let written = encoder.written.lock().unwrap().len();
            assert!(written == 0 || written == 3, "partial flush: {written}");
            assert!(session.is_closed());
            assert_eq!(session.retained(), 0);
        }
    }

    #[test]
    fn test_close_during_delivery_leaves_nothing_retained() {
        let handle = FakeFeedHandle::default();
        let session = Arc::new(CaptureSession::new(handle.feed(), 1000, RetentionLimit::Frames(64)));
        session.start().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let handle = handle.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut tag = 0u8;
                while !stop.load(Ordering::SeqCst) {
                    if !handle.deliver(2, 2, tag) {
                        break;
                    }
                    tag = tag.wrapping_add(1);
                    std::thread::sleep(Duration::from_micros(200));
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(session.close());
        stop.store(true, Ordering::SeqCst);
        producer.join().unwrap();

        assert_eq!(session.retained(), 0);
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
        assert!(!handle.deliver(2, 2, 0));
    }

    #[test]
    fn test_flush_writes_frames_in_order() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(2));
        let base = Instant::now();
        for (i, tag) in [b'A', b'B', b'C'].into_iter().enumerate() {
            let pixels = vec![tag; 16];
            let at = base + Duration::from_secs(i as u64 * 2);
            assert_eq!(session.on_frame_arrived_at(&surface(&pixels), at), FrameDisposition::Stored);
        }

        let encoder = RecordingEncoder::default();
        let dir = tempfile::tempdir().unwrap();
        let outcome = session.close_and_flush(dir.path(), &encoder).unwrap();

        assert_eq!(outcome, FlushOutcome::Flushed { frames: 2 });
        assert_eq!(
            *encoder.written.lock().unwrap(),
            vec![
                ("screenshot0001.jpg".to_string(), b'B'),
                ("screenshot0002.jpg".to_string(), b'C'),
            ]
        );
        assert!(session.is_closed());
        assert_eq!(session.retained(), 0);
    }

    #[test]
    fn test_flush_skipped_after_close() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(2));
        let pixels = vec![1u8; 16];
        session.on_frame_arrived(&surface(&pixels));
        session.close();

        let encoder = RecordingEncoder::default();
        let outcome = session.close_and_flush(Path::new("/nowhere"), &encoder).unwrap();
        assert_eq!(outcome, FlushOutcome::AlreadyClosed);
        assert!(encoder.written.lock().unwrap().is_empty());

        // And never twice
        assert_eq!(
            session.close_and_flush(Path::new("/nowhere"), &encoder).unwrap(),
            FlushOutcome::AlreadyClosed
        );
    }

    #[test]
    fn test_flush_unsubscribes_before_writing() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(2));
        session.start().unwrap();

        let encoder = RecordingEncoder::default();
        session.close_and_flush(Path::new("/tmp"), &encoder).unwrap();
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
        assert!(!handle.deliver(2, 2, 9));
    }

    #[test]
    fn test_encoder_failure_aborts_flush() {
        let handle = FakeFeedHandle::default();
        let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(5));
        let base = Instant::now();
        for i in 0..3u64 {
            let pixels = vec![i as u8; 16];
            session.on_frame_arrived_at(&surface(&pixels), base + Duration::from_secs(i * 2));
        }

        let encoder = RecordingEncoder {
            fail_at: Some(1),
            ..Default::default()
        };
        let result = session.close_and_flush(Path::new("/tmp"), &encoder);

        assert!(matches!(result, Err(SessionError::Encode(_))));
        assert_eq!(encoder.written.lock().unwrap().len(), 1);
        assert!(session.is_closed());
    }

    #[test]
    fn test_drop_closes_feed() {
        let handle = FakeFeedHandle::default();
        {
            let session = CaptureSession::new(handle.feed(), 1, RetentionLimit::Frames(2));
            session.start().unwrap();
        }
        assert_eq!(handle.unsubscribes.load(Ordering::SeqCst), 1);
    }
}
