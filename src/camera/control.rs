//! Control Channel
//!
//! Feature-change requests travel from any number of UI-side senders to the
//! acquisition thread, which is the only thread allowed to touch the device's
//! feature interface. The queue is FIFO with no coalescing: every request is
//! applied in emission order, so the last one issued is the one that sticks.
//!
//! The same lock guards the session's `running` flag, so the acquisition
//! thread can block on a single condition variable and wake for either a new
//! request or a stop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::camera::device::FeatureName;
use crate::camera::features::{ExposureAuto, FeatureGateway, FeatureOutcome, GainAuto};

/// A queued feature change.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Exposure auto mode.
    SetExposureAutoMode(ExposureAuto),
    /// Exposure time in microseconds.
    SetExposureTime(f64),
    /// Gain auto mode.
    SetGainAutoMode(GainAuto),
    /// Gain in decibels.
    SetGain(f64),
    /// Gamma correction on or off.
    SetGammaEnable(bool),
    /// Black level offset, clamped to the device range.
    SetBlackLevel(f64),
}

impl ControlRequest {
    /// Feature this request writes.
    pub fn feature(&self) -> FeatureName {
        match self {
            ControlRequest::SetExposureAutoMode(_) => FeatureName::ExposureAuto,
            ControlRequest::SetExposureTime(_) => FeatureName::ExposureTime,
            ControlRequest::SetGainAutoMode(_) => FeatureName::GainAuto,
            ControlRequest::SetGain(_) => FeatureName::Gain,
            ControlRequest::SetGammaEnable(_) => FeatureName::GammaEnable,
            ControlRequest::SetBlackLevel(_) => FeatureName::BlackLevel,
        }
    }

    /// Apply through the gateway. Never fails the session.
    pub fn apply(&self, gateway: &mut FeatureGateway<'_>) -> FeatureOutcome {
        let feature = self.feature();
        match *self {
            ControlRequest::SetExposureAutoMode(mode) => gateway.set_enum(feature, mode.as_str()),
            ControlRequest::SetGainAutoMode(mode) => gateway.set_enum(feature, mode.as_str()),
            ControlRequest::SetGammaEnable(enabled) => gateway.set_bool(feature, enabled),
            ControlRequest::SetExposureTime(value)
            | ControlRequest::SetGain(value)
            | ControlRequest::SetBlackLevel(value) => gateway.set_clamped_float(feature, value),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ControlRequest>,
    /// Requests are accepted only while a session is active.
    open: bool,
    /// Cleared to ask the acquisition loop to unwind.
    running: bool,
}

/// What the acquisition loop observed after waiting.
#[derive(Debug, PartialEq)]
pub enum Wake {
    /// Requests to apply, oldest first.
    Requests(Vec<ControlRequest>),
    /// Wait elapsed with nothing to do.
    Idle,
    /// Stop was requested.
    Stop,
}

/// Shared queue between senders and the acquisition loop.
#[derive(Debug, Default)]
pub struct ControlQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl ControlQueue {
    /// A closed queue: pushes are dropped until a session opens it.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Begin a session: accept requests and mark the loop as running.
    pub(crate) fn open(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.open = true;
        state.running = true;
    }

    /// End a session: stop accepting requests and discard leftovers.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        let discarded = state.pending.len();
        state.pending.clear();
        state.open = false;
        state.running = false;
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped control requests left at session end");
        }
    }

    /// Ask the loop to stop and wake it.
    pub(crate) fn request_stop(&self) {
        self.state.lock().running = false;
        self.wakeup.notify_all();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Enqueue a request. Returns `false` if no session is active.
    pub fn push(&self, request: ControlRequest) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            tracing::debug!(?request, "No active session, dropping control request");
            return false;
        }
        state.pending.push_back(request);
        drop(state);
        self.wakeup.notify_one();
        true
    }

    /// Number of requests waiting to be applied.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Block for at most `timeout` until there is work or a stop request.
    ///
    /// Stop wins over pending requests.
    pub(crate) fn wait(&self, timeout: Duration) -> Wake {
        let mut state = self.state.lock();
        if state.running && state.pending.is_empty() {
            let _ = self.wakeup.wait_for(&mut state, timeout);
        }
        if !state.running {
            return Wake::Stop;
        }
        if state.pending.is_empty() {
            return Wake::Idle;
        }
        Wake::Requests(state.pending.drain(..).collect())
    }
}

/// Cloneable handle for issuing control requests from any thread.
#[derive(Debug, Clone)]
pub struct ControlSender {
    queue: Arc<ControlQueue>,
}

impl ControlSender {
    pub(crate) fn new(queue: Arc<ControlQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a request; `false` when it was dropped for lack of a session.
    pub fn send(&self, request: ControlRequest) -> bool {
        self.queue.push(request)
    }

    /// Queue [`ControlRequest::SetExposureAutoMode`].
    pub fn set_exposure_auto_mode(&self, mode: ExposureAuto) -> bool {
        self.send(ControlRequest::SetExposureAutoMode(mode))
    }

    /// Queue [`ControlRequest::SetExposureTime`].
    pub fn set_exposure_time(&self, microseconds: f64) -> bool {
        self.send(ControlRequest::SetExposureTime(microseconds))
    }

    /// Queue [`ControlRequest::SetGainAutoMode`].
    pub fn set_gain_auto_mode(&self, mode: GainAuto) -> bool {
        self.send(ControlRequest::SetGainAutoMode(mode))
    }

    /// Queue [`ControlRequest::SetGain`].
    pub fn set_gain(&self, decibels: f64) -> bool {
        self.send(ControlRequest::SetGain(decibels))
    }

    /// Queue [`ControlRequest::SetGammaEnable`].
    pub fn set_gamma_enable(&self, enabled: bool) -> bool {
        self.send(ControlRequest::SetGammaEnable(enabled))
    }

    /// Queue [`ControlRequest::SetBlackLevel`].
    pub fn set_black_level(&self, value: f64) -> bool {
        self.send(ControlRequest::SetBlackLevel(value))
    }
}
