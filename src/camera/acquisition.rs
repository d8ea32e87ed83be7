//! Acquisition Loop
//!
//! One [`CameraSession`] drives at most one streaming session at a time. The
//! session runs on a dedicated thread that owns the device handle from open to
//! release:
//!
//! ```text
//! Idle -> Starting -> Streaming -> Stopping -> Idle
//!           |                                   ^
//!           +---- enumeration / open / start ---+  (Error event)
//! ```
//!
//! While streaming, the thread blocks on the control queue with a bounded
//! timeout and applies feature requests as they arrive. Frames are handled by
//! the [`FramePipeline`] inside the driver callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::camera::control::{ControlQueue, ControlSender, Wake};
use crate::camera::device::{CameraDescriptor, CameraDevice, CameraSystem, FeatureName, PixelFormat};
use crate::camera::features::{ExposureAuto, FeatureGateway, GainAuto};
use crate::camera::pipeline::{FramePipeline, FrameStatistics, StatsSnapshot};
use crate::camera::{CameraEvent, EventReceiver, EventSender, SessionState};
use crate::error::{RigError, RigResult};

/// Default wait between liveness checks of the acquisition loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Session tuning.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Upper bound on how long the loop sleeps without new requests.
    pub poll_interval: Duration,
    /// Format requested from the camera during bring-up.
    pub pixel_format: PixelFormat,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pixel_format: PixelFormat::Mono8,
        }
    }
}

/// State shared between the session handle and its thread.
struct Shared {
    state: Mutex<SessionState>,
    queue: Arc<ControlQueue>,
    stats: Arc<FrameStatistics>,
}

impl Shared {
    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        tracing::debug!(from = %*state, to = %next, "Session state change");
        *state = next;
    }
}

/// Owner of the acquisition thread and the consumer-facing API.
pub struct CameraSession {
    system: Arc<dyn CameraSystem>,
    config: AcquisitionConfig,
    shared: Arc<Shared>,
    events: EventSender,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CameraSession {
    /// Create an idle session and the receiver for its events.
    pub fn new(system: Arc<dyn CameraSystem>, config: AcquisitionConfig) -> (Self, EventReceiver) {
        let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
        let session = Self {
            system,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                queue: ControlQueue::new(),
                stats: Arc::new(FrameStatistics::default()),
            }),
            events,
            worker: Mutex::new(None),
        };
        (session, receiver)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Handle for queueing feature changes. Requests sent while the session
    /// is idle are dropped.
    pub fn controls(&self) -> ControlSender {
        ControlSender::new(self.shared.queue.clone())
    }

    /// Frame counters of the current (or last) session.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Start a session on `camera_selector`, or the first camera found.
    ///
    /// Returns `Ok(false)` without side effects if a session is already
    /// active. Enumeration and device failures are reported asynchronously
    /// as [`CameraEvent::Error`].
    ///
    /// # Errors
    ///
    /// Only if the acquisition thread cannot be spawned.
    pub fn start(&self, camera_selector: Option<&str>) -> RigResult<bool> {
        let mut worker = self.worker.lock();
        {
            let mut state = self.shared.state.lock();
            if *state != SessionState::Idle {
                tracing::debug!(state = %*state, "Session already active, ignoring start");
                return Ok(false);
            }
            *state = SessionState::Starting;
        }

        // A session that ended on its own leaves a finished thread behind.
        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                tracing::error!("Previous acquisition thread panicked");
            }
        }

        self.shared.queue.open();
        self.shared.stats.reset();

        let session = SessionThread {
            system: self.system.clone(),
            selector: camera_selector.map(str::to_owned),
            config: self.config.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        let spawned = thread::Builder::new()
            .name("camera-acquisition".into())
            .spawn(move || session.run());

        match spawned {
            Ok(handle) => {
                tracing::info!(selector = ?camera_selector, "Camera session starting");
                *worker = Some(handle);
                Ok(true)
            }
            Err(e) => {
                self.shared.queue.close();
                self.shared.set_state(SessionState::Idle);
                Err(RigError::Io(e))
            }
        }
    }

    /// Stop the session and wait until its thread has fully unwound.
    ///
    /// On return the device handle is released, `StoppedStreaming` has been
    /// queued (if streaming had begun) and the state is `Idle`. Calling this
    /// on an idle session does nothing.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        self.shared.queue.request_stop();
        if handle.thread().id() == thread::current().id() {
            tracing::warn!("stop() called from the acquisition thread, not joining");
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Acquisition thread panicked during shutdown");
            self.shared.queue.close();
            self.shared.set_state(SessionState::Idle);
        }
        tracing::info!("Camera session stopped");
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Session Thread
// =============================================================================

struct SessionThread {
    system: Arc<dyn CameraSystem>,
    selector: Option<String>,
    config: AcquisitionConfig,
    shared: Arc<Shared>,
    events: EventSender,
}

impl SessionThread {
    fn run(self) {
        let span = tracing::info_span!("camera_session", selector = ?self.selector);
        let _entered = span.enter();

        if let Err(e) = self.stream() {
            tracing::error!(error = %e, "Camera session failed");
            let _ = self.events.send(CameraEvent::Error(e.to_string()));
        }

        // Close before going idle so a new session never sees this one's queue.
        self.shared.queue.close();
        self.shared.set_state(SessionState::Idle);
    }

    fn select_camera(&self) -> RigResult<CameraDescriptor> {
        let cameras = self
            .system
            .cameras()
            .map_err(|e| RigError::device("enumerate", e))?;
        tracing::debug!(count = cameras.len(), "Cameras enumerated");

        let matched = self
            .selector
            .as_deref()
            .and_then(|id| cameras.iter().find(|c| c.id == id));
        if matched.is_none() && self.selector.is_some() && !cameras.is_empty() {
            tracing::warn!(
                selector = ?self.selector,
                "Requested camera not found, using first camera"
            );
        }
        matched
            .or_else(|| cameras.first())
            .cloned()
            .ok_or(RigError::NoDeviceFound)
    }

    /// Everything between open and release. The device is dropped on every
    /// return path.
    fn stream(&self) -> RigResult<()> {
        let camera = self.select_camera()?;
        let mut device = self
            .system
            .open(&camera.id)
            .map_err(|e| RigError::device("open", e))?;
        tracing::info!(camera = %camera.id, model = %camera.model, "Camera opened");

        bring_up(device.as_mut(), self.config.pixel_format);

        if !self.shared.queue.is_running() {
            tracing::info!("Stop requested during bring-up");
            return Ok(());
        }

        let announcer = Arc::new(StreamAnnouncer::new(self.shared.clone(), self.events.clone()));
        let on_first_frame = announcer.clone();
        let pipeline = FramePipeline::new(self.events.clone(), self.shared.stats.clone())
            .before_first_event(move || on_first_frame.announce());
        if let Err(e) = device.start_streaming(pipeline.into_handler()) {
            if announcer.announced() {
                let _ = self.events.send(CameraEvent::StoppedStreaming);
            }
            return Err(RigError::device("start_streaming", e));
        }
        announcer.announce();
        tracing::info!(camera = %camera.id, "Streaming started");

        self.apply_controls(device.as_mut());

        self.shared.set_state(SessionState::Stopping);
        let stopped = device
            .stop_streaming()
            .map_err(|e| RigError::device("stop_streaming", e));
        drop(device);
        let _ = self.events.send(CameraEvent::StoppedStreaming);
        tracing::info!(
            camera = %camera.id,
            frames = self.shared.stats.snapshot().frames_delivered,
            "Streaming stopped"
        );
        stopped
    }

    /// Wait for requests until stopped. This is the only place feature
    /// writes happen while streaming.
    fn apply_controls(&self, device: &mut dyn CameraDevice) {
        loop {
            match self.shared.queue.wait(self.config.poll_interval) {
                Wake::Stop => break,
                Wake::Idle => {}
                Wake::Requests(requests) => {
                    let mut gateway = FeatureGateway::new(&mut *device);
                    for request in &requests {
                        let outcome = request.apply(&mut gateway);
                        tracing::debug!(?request, ?outcome, "Control request applied");
                    }
                }
            }
        }
    }
}

/// Emits `StartedStreaming` exactly once, from whichever comes first: the
/// driver's first frame callback or `start_streaming` returning.
struct StreamAnnouncer {
    shared: Arc<Shared>,
    events: EventSender,
    done: Mutex<bool>,
}

impl StreamAnnouncer {
    fn new(shared: Arc<Shared>, events: EventSender) -> Self {
        Self {
            shared,
            events,
            done: Mutex::new(false),
        }
    }

    /// Held across the send so no frame event can overtake it.
    fn announce(&self) {
        let mut done = self.done.lock();
        if !*done {
            self.shared.set_state(SessionState::Streaming);
            let _ = self.events.send(CameraEvent::StartedStreaming);
            *done = true;
        }
    }

    fn announced(&self) -> bool {
        *self.done.lock()
    }
}

/// Best-effort configuration applied to every freshly opened camera.
fn bring_up(device: &mut dyn CameraDevice, pixel_format: PixelFormat) {
    let mut gateway = FeatureGateway::new(device);
    gateway.set_enum(FeatureName::AcquisitionMode, "Continuous");
    gateway.set_enum(FeatureName::ExposureAuto, ExposureAuto::Continuous.as_str());
    gateway.set_enum(FeatureName::GainAuto, GainAuto::Continuous.as_str());
    gateway.set_bool(FeatureName::GammaEnable, false);
    gateway.set_pixel_format(pixel_format);
}
