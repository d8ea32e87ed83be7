//! Control panel model.
//!
//! UI-side state of the camera controls and the rules for turning edits into
//! [`ControlRequest`]s. Manual values only reach the camera while the matching
//! auto mode is `Off`; switching a mode to `Off` pushes the manual value held
//! by the panel so the camera and the panel agree.
//!
//! Every mutator returns the requests it produced. They are also sent when a
//! session's [`ControlSender`] is attached.

use crate::camera::control::{ControlRequest, ControlSender};
use crate::camera::features::{ExposureAuto, GainAuto};
use crate::config::ControlsConfig;

/// Exposure range offered by the panel, in microseconds.
pub const EXPOSURE_RANGE_US: (u32, u32) = (100, 30_000);

/// Gain range offered by the panel, in tenths of a decibel.
pub const GAIN_RANGE_TENTHS: (u32, u32) = (0, 120);

/// UI-side camera settings, pushed to a session as control requests.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    exposure_auto: ExposureAuto,
    exposure_us: u32,
    gain_auto: GainAuto,
    gain_tenths: u32,
    gamma_enable: bool,
    enhance_contrast: bool,
    sender: Option<ControlSender>,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self {
            exposure_auto: ExposureAuto::Continuous,
            exposure_us: EXPOSURE_RANGE_US.0,
            gain_auto: GainAuto::Continuous,
            gain_tenths: GAIN_RANGE_TENTHS.0,
            gamma_enable: false,
            enhance_contrast: true,
            sender: None,
        }
    }
}

impl ControlPanel {
    /// Panel preloaded from configuration. Values outside the panel ranges
    /// are clamped.
    pub fn from_config(controls: &ControlsConfig, enhance_contrast: bool) -> Self {
        let mut panel = Self {
            exposure_auto: controls.exposure_auto,
            gain_auto: controls.gain_auto,
            gamma_enable: controls.gamma_enable,
            enhance_contrast,
            ..Self::default()
        };
        panel.exposure_us = clamp_exposure(controls.exposure_time_us);
        panel.gain_tenths = clamp_gain(controls.gain_db);
        panel
    }

    /// Route future requests to a running session.
    pub fn attach(&mut self, sender: ControlSender) {
        self.sender = Some(sender);
    }

    /// Keep the settings but stop sending.
    pub fn detach(&mut self) {
        self.sender = None;
    }

    /// Whether a session is receiving requests.
    pub fn is_attached(&self) -> bool {
        self.sender.is_some()
    }

    /// Selected exposure mode.
    pub fn exposure_auto(&self) -> ExposureAuto {
        self.exposure_auto
    }

    /// Manual exposure in microseconds.
    pub fn exposure_time_us(&self) -> f64 {
        f64::from(self.exposure_us)
    }

    /// Selected gain mode.
    pub fn gain_auto(&self) -> GainAuto {
        self.gain_auto
    }

    /// Manual gain in dB.
    pub fn gain_db(&self) -> f64 {
        f64::from(self.gain_tenths) / 10.0
    }

    /// Gamma correction setting.
    pub fn gamma_enable(&self) -> bool {
        self.gamma_enable
    }

    /// Histogram equalization toggle for the display.
    pub fn enhance_contrast(&self) -> bool {
        self.enhance_contrast
    }

    /// Whether the exposure slider is editable.
    pub fn manual_exposure_enabled(&self) -> bool {
        self.exposure_auto == ExposureAuto::Off
    }

    /// Whether the gain slider is editable.
    pub fn manual_gain_enabled(&self) -> bool {
        self.gain_auto == GainAuto::Off
    }

    /// Push the whole panel state, e.g. right after a session starts.
    pub fn apply_all(&self) -> Vec<ControlRequest> {
        let mut requests = vec![ControlRequest::SetExposureAutoMode(self.exposure_auto)];
        if self.manual_exposure_enabled() {
            requests.push(ControlRequest::SetExposureTime(self.exposure_time_us()));
        }
        requests.push(ControlRequest::SetGainAutoMode(self.gain_auto));
        if self.manual_gain_enabled() {
            requests.push(ControlRequest::SetGain(self.gain_db()));
        }
        requests.push(ControlRequest::SetGammaEnable(self.gamma_enable));
        self.dispatch(requests)
    }

    /// Change the exposure mode. Switching to Off also pushes the manual time.
    pub fn set_exposure_auto(&mut self, mode: ExposureAuto) -> Vec<ControlRequest> {
        self.exposure_auto = mode;
        let mut requests = vec![ControlRequest::SetExposureAutoMode(mode)];
        if self.manual_exposure_enabled() {
            requests.push(ControlRequest::SetExposureTime(self.exposure_time_us()));
        }
        self.dispatch(requests)
    }

    /// Edit the manual exposure. Sent only while exposure auto is `Off`.
    pub fn set_exposure_time(&mut self, microseconds: f64) -> Vec<ControlRequest> {
        self.exposure_us = clamp_exposure(microseconds);
        if !self.manual_exposure_enabled() {
            return Vec::new();
        }
        self.dispatch(vec![ControlRequest::SetExposureTime(self.exposure_time_us())])
    }

    /// Change the gain mode. Switching to Off also pushes the manual gain.
    pub fn set_gain_auto(&mut self, mode: GainAuto) -> Vec<ControlRequest> {
        self.gain_auto = mode;
        let mut requests = vec![ControlRequest::SetGainAutoMode(mode)];
        if self.manual_gain_enabled() {
            requests.push(ControlRequest::SetGain(self.gain_db()));
        }
        self.dispatch(requests)
    }

    /// Edit the manual gain in dB, kept at 0.1 dB resolution. Sent only while
    /// gain auto is `Off`.
    pub fn set_gain(&mut self, decibels: f64) -> Vec<ControlRequest> {
        self.gain_tenths = clamp_gain(decibels);
        if !self.manual_gain_enabled() {
            return Vec::new();
        }
        self.dispatch(vec![ControlRequest::SetGain(self.gain_db())])
    }

    /// Toggle gamma correction.
    pub fn set_gamma_enable(&mut self, enabled: bool) -> Vec<ControlRequest> {
        self.gamma_enable = enabled;
        self.dispatch(vec![ControlRequest::SetGammaEnable(enabled)])
    }

    /// Display-only toggle; never reaches the camera.
    pub fn set_enhance_contrast(&mut self, enabled: bool) {
        self.enhance_contrast = enabled;
    }

    fn dispatch(&self, requests: Vec<ControlRequest>) -> Vec<ControlRequest> {
        if let Some(sender) = &self.sender {
            for request in &requests {
                sender.send(request.clone());
            }
        }
        requests
    }
}

fn clamp_exposure(microseconds: f64) -> u32 {
    let (lo, hi) = EXPOSURE_RANGE_US;
    if microseconds.is_nan() {
        return lo;
    }
    microseconds.round().clamp(f64::from(lo), f64::from(hi)) as u32
}

fn clamp_gain(decibels: f64) -> u32 {
    let (lo, hi) = GAIN_RANGE_TENTHS;
    if decibels.is_nan() {
        return lo;
    }
    (decibels * 10.0).round().clamp(f64::from(lo), f64::from(hi)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::control::ControlQueue;

    #[test]
    fn defaults_leave_everything_automatic() {
        let panel = ControlPanel::default();
        assert!(!panel.manual_exposure_enabled());
        assert!(!panel.manual_gain_enabled());
        assert!(panel.enhance_contrast());
        assert_eq!(
            panel.apply_all(),
            vec![
                ControlRequest::SetExposureAutoMode(ExposureAuto::Continuous),
                ControlRequest::SetGainAutoMode(GainAuto::Continuous),
                ControlRequest::SetGammaEnable(false),
            ]
        );
    }

    #[test]
    fn manual_values_wait_for_mode_off() {
        let mut panel = ControlPanel::default();
        assert!(panel.set_exposure_time(5_000.0).is_empty());
        assert_eq!(
            panel.set_exposure_auto(ExposureAuto::Off),
            vec![
                ControlRequest::SetExposureAutoMode(ExposureAuto::Off),
                ControlRequest::SetExposureTime(5_000.0),
            ]
        );
        assert_eq!(
            panel.set_exposure_time(50_000.0),
            vec![ControlRequest::SetExposureTime(30_000.0)]
        );
    }

    #[test]
    fn gain_uses_tenth_db_steps() {
        let mut panel = ControlPanel::default();
        panel.set_gain_auto(GainAuto::Off);
        assert_eq!(panel.set_gain(3.14), vec![ControlRequest::SetGain(3.1)]);
        assert_eq!(panel.set_gain(99.0), vec![ControlRequest::SetGain(12.0)]);
    }

    #[test]
    fn attached_panel_feeds_the_queue() {
        let queue = ControlQueue::new();
        queue.open();
        let mut panel = ControlPanel::default();
        panel.set_gamma_enable(true);
        assert_eq!(queue.pending(), 0);

        panel.attach(ControlSender::new(queue.clone()));
        panel.apply_all();
        assert_eq!(queue.pending(), 3);
    }

    #[test]
    fn config_values_are_clamped() {
        let controls = ControlsConfig {
            exposure_auto: ExposureAuto::Off,
            exposure_time_us: 10.0,
            gain_auto: GainAuto::Off,
            gain_db: 20.0,
            gamma_enable: true,
        };
        let panel = ControlPanel::from_config(&controls, false);
        assert_eq!(panel.exposure_time_us(), 100.0);
        assert_eq!(panel.gain_db(), 12.0);
        assert!(!panel.enhance_contrast());
    }
}
