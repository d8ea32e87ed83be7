//! Simulated camera driver.
//!
//! Implements the driver traits in [`crate::camera::device`] without hardware.
//! The simulation keeps the parts of a real SDK the acquisition core depends
//! on:
//!
//! - a per-model feature tree (enumerations, booleans, ranged floats)
//! - a fixed pool of driver buffers that frames are leased from and requeued to
//! - frame delivery on a driver-owned thread
//! - scripted failures for enumeration, open and streaming
//!
//! A [`MockCamera`] is a cheap handle onto shared state, so tests can keep a
//! clone to inspect feature writes and buffer accounting after moving the
//! camera into a [`MockCameraSystem`].
//!
//! Requeued buffers are overwritten with [`SCRIBBLE_BYTE`] before reuse, the
//! way a driver would recycle its memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::camera::device::{
    CameraDescriptor, CameraDevice, CameraSystem, FeatureAccess, FeatureName, FeatureValue,
    FrameHandler, FrameLease, PixelFormat,
};
use crate::error::DeviceError;

/// Byte written over a buffer when it returns to the pool.
pub const SCRIBBLE_BYTE: u8 = 0xEE;

/// Default number of driver buffers.
const DEFAULT_POOL_SIZE: usize = 4;

/// Default delay between produced frames (~100 fps).
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Feature Tree
// =============================================================================

#[derive(Debug, Clone)]
enum MockFeature {
    Enum {
        entries: Vec<&'static str>,
        current: String,
    },
    Bool(bool),
    Float {
        lo: f64,
        hi: f64,
        value: f64,
    },
}

impl MockFeature {
    fn value(&self) -> FeatureValue {
        match self {
            MockFeature::Enum { current, .. } => FeatureValue::Enum(current.clone()),
            MockFeature::Bool(value) => FeatureValue::Bool(*value),
            MockFeature::Float { value, .. } => FeatureValue::Float(*value),
        }
    }
}

/// Feature tree of a typical industrial monochrome camera.
fn default_features() -> HashMap<FeatureName, MockFeature> {
    let mut features = HashMap::new();
    features.insert(
        FeatureName::AcquisitionMode,
        MockFeature::Enum {
            entries: vec!["Continuous", "SingleFrame", "MultiFrame"],
            current: "SingleFrame".into(),
        },
    );
    features.insert(
        FeatureName::ExposureAuto,
        MockFeature::Enum {
            entries: vec!["Off", "Once", "Continuous"],
            current: "Off".into(),
        },
    );
    features.insert(
        FeatureName::GainAuto,
        MockFeature::Enum {
            entries: vec!["Off", "Continuous"],
            current: "Off".into(),
        },
    );
    features.insert(FeatureName::GammaEnable, MockFeature::Bool(true));
    features.insert(
        FeatureName::ExposureTime,
        MockFeature::Float {
            lo: 10.0,
            hi: 1_000_000.0,
            value: 10_000.0,
        },
    );
    features.insert(
        FeatureName::Gain,
        MockFeature::Float {
            lo: 0.0,
            hi: 24.0,
            value: 0.0,
        },
    );
    features.insert(
        FeatureName::BlackLevel,
        MockFeature::Float {
            lo: 0.0,
            hi: 255.0,
            value: 0.0,
        },
    );
    features
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug)]
struct MockState {
    width: u32,
    height: u32,
    row_padding: usize,
    features: HashMap<FeatureName, MockFeature>,
    failing_features: Vec<FeatureName>,
    writes: Vec<(FeatureName, FeatureValue)>,
    formats: Vec<PixelFormat>,
    pixel_format: PixelFormat,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    truncate_to: Option<usize>,
    open_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    pool: Vec<Vec<u8>>,
    pool_size: usize,
    outstanding: usize,
    requeued: u64,
    produced: u64,
    starved: u64,
    open_handles: usize,
    opens: u64,
}

impl MockState {
    /// Bytes per row for the current format, padding included.
    fn stride(&self) -> usize {
        row_bytes(self.pixel_format, self.width) + self.row_padding
    }

    fn frame_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}

fn row_bytes(format: PixelFormat, width: u32) -> usize {
    let width = width as usize;
    match format.bytes_per_pixel() {
        Some(bpp) => width * bpp,
        None => (width * 3).div_ceil(2),
    }
}

type SharedState = Arc<Mutex<MockState>>;

// =============================================================================
// MockCamera
// =============================================================================

/// Scriptable simulated camera.
#[derive(Debug, Clone)]
pub struct MockCamera {
    id: String,
    model: String,
    state: SharedState,
}

impl MockCamera {
    /// A Mono8 camera with the default feature tree and no padding.
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            model: "Mock Mono Camera".into(),
            state: Arc::new(Mutex::new(MockState {
                width,
                height,
                row_padding: 0,
                features: default_features(),
                failing_features: Vec::new(),
                writes: Vec::new(),
                formats: vec![PixelFormat::Mono8],
                pixel_format: PixelFormat::Mono8,
                frame_interval: DEFAULT_FRAME_INTERVAL,
                frame_limit: None,
                truncate_to: None,
                open_error: None,
                start_error: None,
                stop_error: None,
                pool: Vec::new(),
                pool_size: DEFAULT_POOL_SIZE,
                outstanding: 0,
                requeued: 0,
                produced: 0,
                starved: 0,
                open_handles: 0,
                opens: 0,
            })),
        }
    }

    /// Model string reported by enumeration.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the range (and clamp the value) of a float feature.
    pub fn with_float_range(self, name: FeatureName, lo: f64, hi: f64) -> Self {
        {
            let mut state = self.state.lock();
            let value = match state.features.get(&name) {
                Some(MockFeature::Float { value, .. }) => value.clamp(lo, hi),
                _ => lo,
            };
            state
                .features
                .insert(name, MockFeature::Float { lo, hi, value });
        }
        self
    }

    /// Remove a feature from the tree.
    pub fn without_feature(self, name: FeatureName) -> Self {
        self.state.lock().features.remove(&name);
        self
    }

    /// Make every write to `name` fail with a driver error.
    pub fn with_failing_feature(self, name: FeatureName) -> Self {
        self.state.lock().failing_features.push(name);
        self
    }

    /// Pixel formats the camera accepts. The first one is the power-on format.
    pub fn with_formats(self, formats: &[PixelFormat]) -> Self {
        {
            let mut state = self.state.lock();
            state.formats = formats.to_vec();
            if let Some(first) = formats.first() {
                state.pixel_format = *first;
            }
        }
        self
    }

    /// Extra bytes at the end of every row.
    pub fn with_row_padding(self, bytes: usize) -> Self {
        self.state.lock().row_padding = bytes;
        self
    }

    /// Delay between produced frames.
    pub fn with_frame_interval(self, interval: Duration) -> Self {
        self.state.lock().frame_interval = interval;
        self
    }

    /// Stop producing after `frames` frames per session.
    pub fn with_frame_limit(self, frames: u64) -> Self {
        self.state.lock().frame_limit = Some(frames);
        self
    }

    /// Lend only the first `bytes` bytes of every frame buffer.
    pub fn with_truncated_frames(self, bytes: usize) -> Self {
        self.state.lock().truncate_to = Some(bytes);
        self
    }

    /// Number of driver buffers (at least one).
    pub fn with_pool_size(self, buffers: usize) -> Self {
        self.state.lock().pool_size = buffers.max(1);
        self
    }

    /// Opening the camera fails with `message`.
    pub fn failing_open(self, message: impl Into<String>) -> Self {
        self.state.lock().open_error = Some(message.into());
        self
    }

    /// `start_streaming` fails with `message`.
    pub fn failing_start(self, message: impl Into<String>) -> Self {
        self.state.lock().start_error = Some(message.into());
        self
    }

    /// `stop_streaming` fails with `message` after halting.
    pub fn failing_stop(self, message: impl Into<String>) -> Self {
        self.state.lock().stop_error = Some(message.into());
        self
    }

    /// Camera ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enumeration entry for this camera.
    pub fn descriptor(&self) -> CameraDescriptor {
        CameraDescriptor {
            id: self.id.clone(),
            model: self.model.clone(),
        }
    }

    /// Open a handle directly, bypassing the system and scripted open errors.
    pub fn open_handle(&self) -> Box<dyn CameraDevice> {
        Box::new(MockDevice::new(self.id.clone(), self.state.clone()))
    }

    /// Successful feature writes, oldest first.
    pub fn writes(&self) -> Vec<(FeatureName, FeatureValue)> {
        self.state.lock().writes.clone()
    }

    /// Current value of a feature, if present.
    pub fn value(&self, name: FeatureName) -> Option<FeatureValue> {
        self.state.lock().features.get(&name).map(MockFeature::value)
    }

    /// Current pixel format.
    pub fn pixel_format(&self) -> PixelFormat {
        self.state.lock().pixel_format
    }

    /// Frames handed to the frame callback.
    pub fn frames_produced(&self) -> u64 {
        self.state.lock().produced
    }

    /// Buffers returned through [`FrameLease::requeue`].
    pub fn frames_requeued(&self) -> u64 {
        self.state.lock().requeued
    }

    /// Leases currently held outside the driver.
    pub fn outstanding_leases(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Ticks skipped because every buffer was leased out.
    pub fn starved_ticks(&self) -> u64 {
        self.state.lock().starved
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Handles opened over the camera's lifetime.
    pub fn total_opens(&self) -> u64 {
        self.state.lock().opens
    }
}

// =============================================================================
// MockCameraSystem
// =============================================================================

/// Simulated driver entry point.
#[derive(Debug, Default)]
pub struct MockCameraSystem {
    cameras: Vec<MockCamera>,
    enumeration_error: Option<String>,
}

impl MockCameraSystem {
    /// A system with no cameras attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a camera.
    pub fn with_camera(mut self, camera: MockCamera) -> Self {
        self.cameras.push(camera);
        self
    }

    /// Enumeration fails with `message`.
    pub fn failing_enumeration(mut self, message: impl Into<String>) -> Self {
        self.enumeration_error = Some(message.into());
        self
    }
}

impl CameraSystem for MockCameraSystem {
    fn cameras(&self) -> Result<Vec<CameraDescriptor>, DeviceError> {
        if let Some(message) = &self.enumeration_error {
            return Err(DeviceError::call("enumerate", message.clone()));
        }
        Ok(self.cameras.iter().map(MockCamera::descriptor).collect())
    }

    fn open(&self, id: &str) -> Result<Box<dyn CameraDevice>, DeviceError> {
        let camera = self
            .cameras
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| DeviceError::UnknownCamera(id.to_string()))?;
        if let Some(message) = camera.state.lock().open_error.clone() {
            return Err(DeviceError::call("open", message));
        }
        Ok(camera.open_handle())
    }
}

// =============================================================================
// Device Handle
// =============================================================================

struct MockFeatureHandle {
    name: FeatureName,
    state: SharedState,
}

impl MockFeatureHandle {
    fn write(
        &mut self,
        apply: impl FnOnce(&mut MockFeature) -> Result<FeatureValue, DeviceError>,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.failing_features.contains(&self.name) {
            return Err(DeviceError::call("write", format!("{} is locked", self.name)));
        }
        let feature = state
            .features
            .get_mut(&self.name)
            .ok_or_else(|| DeviceError::call("write", format!("{} vanished", self.name)))?;
        let written = apply(feature)?;
        state.writes.push((self.name, written));
        Ok(())
    }
}

impl FeatureAccess for MockFeatureHandle {
    fn set_enum(&mut self, entry: &str) -> Result<(), DeviceError> {
        let name = self.name.as_str();
        self.write(|feature| match feature {
            MockFeature::Enum { entries, current } => {
                if !entries.iter().any(|e| *e == entry) {
                    return Err(DeviceError::InvalidEntry {
                        feature: name,
                        entry: entry.to_string(),
                    });
                }
                *current = entry.to_string();
                Ok(FeatureValue::Enum(current.clone()))
            }
            _ => Err(DeviceError::WrongKind {
                feature: name,
                kind: "enumeration",
            }),
        })
    }

    fn set_bool(&mut self, value: bool) -> Result<(), DeviceError> {
        let name = self.name.as_str();
        self.write(|feature| match feature {
            MockFeature::Bool(current) => {
                *current = value;
                Ok(FeatureValue::Bool(value))
            }
            _ => Err(DeviceError::WrongKind {
                feature: name,
                kind: "boolean",
            }),
        })
    }

    fn set_float(&mut self, value: f64) -> Result<(), DeviceError> {
        let name = self.name.as_str();
        self.write(|feature| match feature {
            MockFeature::Float { lo, hi, value: current } => {
                if !(*lo..=*hi).contains(&value) {
                    return Err(DeviceError::call(
                        "set_float",
                        format!("{value} outside [{lo}, {hi}]"),
                    ));
                }
                *current = value;
                Ok(FeatureValue::Float(value))
            }
            _ => Err(DeviceError::WrongKind {
                feature: name,
                kind: "float",
            }),
        })
    }

    fn float_range(&self) -> Result<(f64, f64), DeviceError> {
        let state = self.state.lock();
        match state.features.get(&self.name) {
            Some(MockFeature::Float { lo, hi, .. }) => Ok((*lo, *hi)),
            Some(_) => Err(DeviceError::WrongKind {
                feature: self.name.as_str(),
                kind: "float",
            }),
            None => Err(DeviceError::call("float_range", format!("{} vanished", self.name))),
        }
    }

    fn value(&self) -> Result<FeatureValue, DeviceError> {
        self.state
            .lock()
            .features
            .get(&self.name)
            .map(MockFeature::value)
            .ok_or_else(|| DeviceError::call("value", format!("{} vanished", self.name)))
    }
}

/// Open handle onto a [`MockCamera`].
struct MockDevice {
    id: String,
    state: SharedState,
    features: Vec<MockFeatureHandle>,
    streaming: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl MockDevice {
    fn new(id: String, state: SharedState) -> Self {
        let features = {
            let mut guard = state.lock();
            guard.open_handles += 1;
            guard.opens += 1;
            FeatureName::ALL
                .iter()
                .filter(|name| guard.features.contains_key(name))
                .map(|&name| MockFeatureHandle {
                    name,
                    state: state.clone(),
                })
                .collect()
        };
        Self {
            id,
            state,
            features,
            streaming: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    fn halt_producer(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                tracing::error!(camera = %self.id, "Mock frame producer panicked");
            }
        }
    }
}

impl CameraDevice for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn feature(&mut self, name: FeatureName) -> Option<&mut dyn FeatureAccess> {
        self.features
            .iter_mut()
            .find(|f| f.name == name)
            .map(|f| f as &mut dyn FeatureAccess)
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if !state.formats.contains(&format) {
            return Err(DeviceError::UnsupportedPixelFormat(format.to_string()));
        }
        if state.pixel_format != format {
            // buffers are sized for the old format
            state.pool.clear();
        }
        state.pixel_format = format;
        Ok(())
    }

    fn pixel_format(&self) -> PixelFormat {
        self.state.lock().pixel_format
    }

    fn start_streaming(&mut self, handler: FrameHandler) -> Result<(), DeviceError> {
        if self.producer.is_some() {
            return Err(DeviceError::call("start_streaming", "already streaming"));
        }
        {
            let mut state = self.state.lock();
            if let Some(message) = state.start_error.clone() {
                return Err(DeviceError::call("start_streaming", message));
            }
            let len = state.frame_len();
            let missing = state.pool_size.saturating_sub(state.pool.len() + state.outstanding);
            for _ in 0..missing {
                state.pool.push(vec![0u8; len]);
            }
        }

        self.streaming.store(true, Ordering::SeqCst);
        let producer = FrameProducer {
            state: self.state.clone(),
            streaming: self.streaming.clone(),
            handler,
        };
        let spawned = thread::Builder::new()
            .name(format!("mock-camera-{}", self.id))
            .spawn(move || producer.run());
        match spawned {
            Ok(handle) => {
                self.producer = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.streaming.store(false, Ordering::SeqCst);
                Err(DeviceError::call("start_streaming", e.to_string()))
            }
        }
    }

    fn stop_streaming(&mut self) -> Result<(), DeviceError> {
        self.halt_producer();
        match self.state.lock().stop_error.clone() {
            Some(message) => Err(DeviceError::call("stop_streaming", message)),
            None => Ok(()),
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.halt_producer();
        self.state.lock().open_handles -= 1;
    }
}

// =============================================================================
// Frame Production
// =============================================================================

/// Driver thread: leases a buffer, paints the next frame and calls the handler.
struct FrameProducer {
    state: SharedState,
    streaming: Arc<AtomicBool>,
    handler: FrameHandler,
}

impl FrameProducer {
    fn run(mut self) {
        let mut sequence = 0u64;
        while self.streaming.load(Ordering::SeqCst) {
            let (lease, interval) = {
                let mut state = self.state.lock();
                let interval = state.frame_interval;
                if state.frame_limit.is_some_and(|limit| sequence >= limit) {
                    (None, interval)
                } else {
                    match state.pool.pop() {
                        Some(mut buffer) => {
                            let geometry = (state.pixel_format, state.width, state.height, state.stride());
                            paint(&mut buffer, geometry, sequence);
                            state.outstanding += 1;
                            state.produced += 1;
                            let (pixel_format, width, height, stride) = geometry;
                            let visible = state
                                .truncate_to
                                .map_or(buffer.len(), |n| n.min(buffer.len()));
                            (
                                Some(MockLease {
                                    buffer,
                                    visible,
                                    pixel_format,
                                    width,
                                    height,
                                    stride,
                                    state: self.state.clone(),
                                }),
                                interval,
                            )
                        }
                        None => {
                            state.starved += 1;
                            (None, interval)
                        }
                    }
                }
            };

            if let Some(lease) = lease {
                sequence += 1;
                (self.handler)(Box::new(lease));
            }
            thread::sleep(interval);
        }
    }
}

/// Test pattern: a diagonal ramp shifted by the frame sequence, encoded in
/// `format`. Every supported format converts back to the same Mono8 ramp.
/// Row padding is filled with `0xFF`.
fn paint(buffer: &mut [u8], (format, width, height, stride): (PixelFormat, u32, u32, usize), sequence: u64) {
    let (w, h) = (width as usize, height as usize);
    let used = row_bytes(format, width);
    for y in 0..h {
        let row = &mut buffer[y * stride..(y + 1) * stride];
        for x in 0..w {
            let level = ((x + y) as u64 + sequence) as u8;
            match format {
                PixelFormat::Mono8
                | PixelFormat::BayerRG8
                | PixelFormat::BayerGR8
                | PixelFormat::BayerGB8
                | PixelFormat::BayerBG8
                | PixelFormat::Mono12Packed => row[x] = level,
                PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                    let shift = match format {
                        PixelFormat::Mono10 => 2,
                        PixelFormat::Mono12 => 4,
                        _ => 8,
                    };
                    let bytes = (u16::from(level) << shift).to_le_bytes();
                    row[x * 2..x * 2 + 2].copy_from_slice(&bytes);
                }
                PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                    row[x * 3..x * 3 + 3].fill(level);
                }
                PixelFormat::Yuv422 => {
                    row[x * 2] = level;
                    row[x * 2 + 1] = 128;
                }
            }
        }
        row[used..].fill(0xFF);
    }
}

/// A pool buffer lent to the frame callback.
struct MockLease {
    buffer: Vec<u8>,
    /// Bytes exposed through `data`.
    visible: usize,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    state: SharedState,
}

impl FrameLease for MockLease {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn data(&self) -> &[u8] {
        &self.buffer[..self.visible]
    }

    fn requeue(self: Box<Self>) {
        let MockLease {
            mut buffer, state, ..
        } = *self;
        buffer.fill(SCRIBBLE_BYTE);
        let mut state = state.lock();
        state.outstanding -= 1;
        state.requeued += 1;
        // stale size after a format switch: let the pool regrow
        if buffer.len() == state.frame_len() {
            state.pool.push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn enumeration_lists_attached_cameras() {
        let system = MockCameraSystem::new()
            .with_camera(MockCamera::new("a", 4, 4))
            .with_camera(MockCamera::new("b", 4, 4).with_model("Other"));
        let ids: Vec<_> = system.cameras().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(matches!(
            system.open("zzz"),
            Err(DeviceError::UnknownCamera(_))
        ));
    }

    #[test]
    fn handles_are_counted() {
        let camera = MockCamera::new("a", 4, 4);
        let system = MockCameraSystem::new().with_camera(camera.clone());
        let handle = system.open("a").unwrap();
        assert_eq!(camera.open_handles(), 1);
        drop(handle);
        assert_eq!(camera.open_handles(), 0);
        assert_eq!(camera.total_opens(), 1);
    }

    #[test]
    fn rejects_unsupported_pixel_format() {
        let camera = MockCamera::new("a", 4, 4).with_formats(&[PixelFormat::BayerRG8]);
        let mut device = camera.open_handle();
        assert_eq!(
            device.set_pixel_format(PixelFormat::Mono8),
            Err(DeviceError::UnsupportedPixelFormat("Mono8".into()))
        );
        assert_eq!(device.pixel_format(), PixelFormat::BayerRG8);
    }

    #[test]
    fn frames_are_leased_and_requeued() {
        let camera = MockCamera::new("a", 8, 2)
            .with_row_padding(3)
            .with_frame_interval(Duration::from_millis(1))
            .with_frame_limit(3);
        let mut device = camera.open_handle();
        let (tx, rx) = mpsc::channel();
        device
            .start_streaming(Box::new(move |lease: Box<dyn FrameLease>| {
                let _ = tx.send((lease.stride(), lease.data()[..8].to_vec()));
                lease.requeue();
            }))
            .unwrap();

        let (stride, first_row) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(stride, 11);
        assert_eq!(first_row, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        device.stop_streaming().unwrap();

        assert_eq!(camera.frames_produced(), 3);
        assert_eq!(camera.frames_requeued(), 3);
        assert_eq!(camera.outstanding_leases(), 0);
    }

    #[test]
    fn scripted_start_failure() {
        let camera = MockCamera::new("a", 4, 4).failing_start("transport busy");
        let mut device = camera.open_handle();
        let err = device.start_streaming(Box::new(|lease| lease.requeue())).unwrap_err();
        assert!(err.to_string().contains("transport busy"));
    }

    #[test]
    fn painted_formats_share_one_ramp() {
        for format in [PixelFormat::Mono12, PixelFormat::Rgb8, PixelFormat::Yuv422] {
            let stride = row_bytes(format, 4);
            let mut buffer = vec![0u8; stride * 2];
            paint(&mut buffer, (format, 4, 2, stride), 5);
            let mono = crate::camera::convert::to_mono8(format, &buffer, 4, 2, stride).unwrap();
            assert_eq!(mono, vec![5, 6, 7, 8, 6, 7, 8, 9], "{format}");
        }
    }
}
