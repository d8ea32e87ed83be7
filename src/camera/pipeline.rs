//! Frame Pipeline
//!
//! Runs inside the driver's frame callback:
//!
//! 1. normalize the pixel format to Mono8
//! 2. copy the pixels into memory the pipeline owns
//! 3. hand the driver frame back to its pool (always, exactly once)
//! 4. deliver the owned frame to the consumer as a queued event
//!
//! Delivery never waits on the consumer. There is no frame-drop policy: a slow
//! consumer grows the event queue, a slow conversion stalls the driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::camera::convert;
use crate::camera::device::{FrameLease, PixelFormat};
use crate::camera::{CameraEvent, EventSender};
use crate::error::{RigError, RigResult};

// =============================================================================
// OwnedFrame
// =============================================================================

/// An immutable Mono8 image owned by the consumer side.
///
/// Invariants: `stride >= width` and `pixels.len() >= stride * height`.
/// Cloning shares the pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pixels: Bytes,
    width: u32,
    height: u32,
    stride: usize,
    frame_number: u64,
}

impl OwnedFrame {
    /// Wrap a Mono8 buffer, checking the geometry invariants.
    pub fn new(pixels: impl Into<Bytes>, width: u32, height: u32, stride: usize) -> RigResult<Self> {
        let pixels = pixels.into();
        if stride < width as usize {
            return Err(RigError::InvalidFrame(format!(
                "stride {stride} is smaller than width {width}"
            )));
        }
        let needed = stride * height as usize;
        if pixels.len() < needed {
            return Err(RigError::InvalidFrame(format!(
                "{} bytes cannot hold {height} rows of stride {stride}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            stride,
            frame_number: 0,
        })
    }

    /// Tag with the session-local sequence number.
    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, including padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sequence number within the session, starting at 1.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Always Mono8.
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Mono8
    }

    /// Raw buffer, padding included.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The `width` visible pixels of row `y`.
    ///
    /// # Panics
    ///
    /// If `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.pixels[start..start + self.width as usize]
    }

    /// Visible pixels with padding removed.
    pub fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.width as usize {
            return self.pixels[..self.stride * self.height as usize].to_vec();
        }
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

// =============================================================================
// Requeue Guard
// =============================================================================

/// Returns the driver frame to its pool when dropped, on every path.
struct RequeueGuard(Option<Box<dyn FrameLease>>);

impl Drop for RequeueGuard {
    fn drop(&mut self) {
        if let Some(lease) = self.0.take() {
            lease.requeue();
        }
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// What became of one driver frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Normalized and copied.
    Ready(OwnedFrame),
    /// Conversion failed; the raw bytes were reinterpreted as Mono8 at
    /// `stride == width`. The image may be garbled.
    Degraded(OwnedFrame, String),
    /// Conversion failed and the buffer was too short to reinterpret.
    Dropped(String),
}

/// Copy a driver frame into an owned Mono8 frame.
///
/// Mono8 frames keep their stride. Converted frames are tightly packed.
fn normalize(frame: &dyn FrameLease) -> RigResult<OwnedFrame> {
    let (format, width, height, stride) = (
        frame.pixel_format(),
        frame.width(),
        frame.height(),
        frame.stride(),
    );
    let data = frame.data();

    if format.is_canonical() && stride >= width as usize {
        let len = stride * height as usize;
        if data.len() >= len {
            return OwnedFrame::new(Bytes::copy_from_slice(&data[..len]), width, height, stride);
        }
    }

    let packed = convert::to_mono8(format, data, width, height, stride)?;
    OwnedFrame::new(packed, width, height, width as usize)
}

/// Reinterpret the leading `width * height` bytes as Mono8.
fn raw_fallback(frame: &dyn FrameLease) -> Option<OwnedFrame> {
    let len = frame.width() as usize * frame.height() as usize;
    let data = frame.data();
    if len == 0 || data.len() < len {
        return None;
    }
    OwnedFrame::new(
        Bytes::copy_from_slice(&data[..len]),
        frame.width(),
        frame.height(),
        frame.width() as usize,
    )
    .ok()
}

/// Normalize, copy and release one driver frame.
///
/// The lease is requeued before this returns, whatever the outcome.
pub fn ingest(lease: Box<dyn FrameLease>) -> FrameOutcome {
    let guard = RequeueGuard(Some(lease));
    let outcome = match guard.0.as_deref() {
        Some(frame) => match normalize(frame) {
            Ok(owned) => FrameOutcome::Ready(owned),
            Err(e) => match raw_fallback(frame) {
                Some(owned) => FrameOutcome::Degraded(owned, e.to_string()),
                None => FrameOutcome::Dropped(e.to_string()),
            },
        },
        None => FrameOutcome::Dropped("frame already released".into()),
    };
    drop(guard);
    outcome
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-session frame counters, shared between the callback and observers.
#[derive(Debug, Default)]
pub struct FrameStatistics {
    delivered: AtomicU64,
    fallbacks: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`FrameStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames sent to the consumer, degraded ones included.
    pub frames_delivered: u64,
    /// Frames delivered through the raw reinterpretation path.
    pub conversion_fallbacks: u64,
    /// Frames that could not be delivered at all.
    pub frames_dropped: u64,
}

impl FrameStatistics {
    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            conversion_fallbacks: self.fallbacks.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.delivered.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs once, before the pipeline emits its first event.
pub type FirstEventHook = Box<dyn FnOnce() + Send>;

/// Frame callback state for one session.
pub struct FramePipeline {
    events: EventSender,
    stats: Arc<FrameStatistics>,
    next_frame: u64,
    before_first_event: Option<FirstEventHook>,
}

impl FramePipeline {
    /// Frames are numbered from 1.
    pub fn new(events: EventSender, stats: Arc<FrameStatistics>) -> Self {
        Self {
            events,
            stats,
            next_frame: 1,
            before_first_event: None,
        }
    }

    /// Run `hook` on the callback thread before the first frame event is sent.
    pub fn before_first_event(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.before_first_event = Some(Box::new(hook));
        self
    }

    fn send(&mut self, event: CameraEvent) -> bool {
        if let Some(hook) = self.before_first_event.take() {
            hook();
        }
        self.events.send(event).is_ok()
    }

    /// Process one driver frame and queue the result for the consumer.
    pub fn handle(&mut self, lease: Box<dyn FrameLease>) {
        let frame = match ingest(lease) {
            FrameOutcome::Ready(frame) => frame,
            FrameOutcome::Degraded(frame, reason) => {
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%reason, "Frame conversion failed, delivering raw bytes");
                frame
            }
            FrameOutcome::Dropped(reason) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%reason, "Frame conversion failed, dropping frame");
                self.send(CameraEvent::ConversionFailed(reason));
                return;
            }
        };

        let frame = frame.with_frame_number(self.next_frame);
        self.next_frame += 1;
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        if !self.send(CameraEvent::FrameReady(frame)) {
            tracing::trace!("Event receiver gone, frame discarded");
        }
    }

    /// Turn the pipeline into a driver frame callback.
    pub fn into_handler(mut self) -> crate::camera::device::FrameHandler {
        Box::new(move |lease| self.handle(lease))
    }
}
