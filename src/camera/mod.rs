//! Camera acquisition and device control.
//!
//! - [`device`]: driver traits (enumeration, handles, features, frame leases)
//! - [`features`]: best-effort feature gateway with range clamping
//! - [`control`]: UI → acquisition thread request queue
//! - [`pipeline`] / [`convert`]: per-frame normalization, copy and delivery
//! - [`acquisition`]: the session state machine and its thread
//! - [`enhance`] / [`display`] / [`panel`]: consumer-side helpers
//! - [`mock`]: simulated camera for tests and the CLI

pub mod acquisition;
pub mod control;
pub mod convert;
pub mod device;
pub mod display;
pub mod enhance;
pub mod features;
pub mod mock;
pub mod panel;
pub mod pipeline;

use std::fmt;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub use acquisition::{AcquisitionConfig, CameraSession};
pub use control::{ControlRequest, ControlSender};
pub use device::{CameraDevice, CameraSystem, FeatureName, FeatureValue, PixelFormat};
pub use features::{ExposureAuto, FeatureGateway, FeatureOutcome, GainAuto};
pub use pipeline::{OwnedFrame, StatsSnapshot};

/// Events delivered to the consumer, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    /// A processed, independently owned Mono8 frame.
    FrameReady(OwnedFrame),
    /// Bring-up finished and the device is streaming. Sent before any frame
    /// event of the session.
    StartedStreaming,
    /// Streaming stopped and the device handle was released.
    StoppedStreaming,
    /// Session-fatal failure. The session is already unwinding.
    Error(String),
    /// A frame could not be converted and was dropped. Not fatal.
    ConversionFailed(String),
}

/// Producer side of the event queue.
pub type EventSender = UnboundedSender<CameraEvent>;

/// Consumer side of the event queue.
pub type EventReceiver = UnboundedReceiver<CameraEvent>;

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No thread and no device handle.
    Idle,
    /// Enumerating, opening or bringing up the camera.
    Starting,
    /// Frames flowing, control requests applied.
    Streaming,
    /// Streaming is being stopped and the handle released.
    Stopping,
}

impl SessionState {
    /// Whether a device handle may exist in this state.
    pub fn holds_device(self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}
