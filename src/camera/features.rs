//! Device Feature Gateway
//!
//! Best-effort writes to the small feature set the rig drives. Feature trees
//! differ between camera models and firmware, so a missing or failing feature
//! never ends a session: the gateway logs and reports a [`FeatureOutcome`]
//! that callers are free to ignore.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::camera::device::{CameraDevice, FeatureName, FeatureValue, PixelFormat};

// =============================================================================
// Auto Modes
// =============================================================================

/// `ExposureAuto` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureAuto {
    Off,
    /// Adjust once, then hold.
    Once,
    Continuous,
}

impl ExposureAuto {
    /// Entry name on the device.
    pub fn as_str(self) -> &'static str {
        match self {
            ExposureAuto::Off => "Off",
            ExposureAuto::Once => "Once",
            ExposureAuto::Continuous => "Continuous",
        }
    }

    /// All entries, in display order.
    pub fn all_choices() -> Vec<String> {
        vec!["Off".into(), "Once".into(), "Continuous".into()]
    }
}

impl FromStr for ExposureAuto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Off" => Ok(ExposureAuto::Off),
            "Once" => Ok(ExposureAuto::Once),
            "Continuous" => Ok(ExposureAuto::Continuous),
            other => Err(format!("unknown exposure auto mode '{other}'")),
        }
    }
}

impl fmt::Display for ExposureAuto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `GainAuto` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainAuto {
    Off,
    Continuous,
}

impl GainAuto {
    /// Entry name on the device.
    pub fn as_str(self) -> &'static str {
        match self {
            GainAuto::Off => "Off",
            GainAuto::Continuous => "Continuous",
        }
    }

    /// All entries, in display order.
    pub fn all_choices() -> Vec<String> {
        vec!["Off".into(), "Continuous".into()]
    }
}

impl FromStr for GainAuto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Off" => Ok(GainAuto::Off),
            "Continuous" => Ok(GainAuto::Continuous),
            other => Err(format!("unknown gain auto mode '{other}'")),
        }
    }
}

impl fmt::Display for GainAuto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Result of one best-effort feature write.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    /// The device accepted this value (after clamping, for floats).
    Applied(FeatureValue),
    /// The device does not expose the feature.
    Unsupported,
    /// The device rejected the write, or the request was unusable.
    Failed(String),
}

impl FeatureOutcome {
    /// True for [`FeatureOutcome::Applied`].
    pub fn is_applied(&self) -> bool {
        matches!(self, FeatureOutcome::Applied(_))
    }
}

/// Clamp `value` into `[lo, hi]`.
///
/// `None` for NaN inputs or an inverted range.
pub fn clamp_to_range(value: f64, lo: f64, hi: f64) -> Option<f64> {
    if value.is_nan() || lo.is_nan() || hi.is_nan() || lo > hi {
        return None;
    }
    Some(value.clamp(lo, hi))
}

/// Best-effort feature writer over a borrowed device handle.
///
/// Only constructed on the thread that owns the handle.
pub struct FeatureGateway<'a> {
    device: &'a mut dyn CameraDevice,
}

impl<'a> FeatureGateway<'a> {
    /// Wrap a handle owned by the calling thread.
    pub fn new(device: &'a mut dyn CameraDevice) -> Self {
        Self { device }
    }

    /// Select an enumeration entry.
    pub fn set_enum(&mut self, name: FeatureName, entry: &str) -> FeatureOutcome {
        let Some(feature) = self.device.feature(name) else {
            tracing::debug!(feature = %name, "Feature not exposed by camera, skipping");
            return FeatureOutcome::Unsupported;
        };
        let outcome = match feature.set_enum(entry) {
            Ok(()) => FeatureOutcome::Applied(FeatureValue::Enum(entry.to_string())),
            Err(e) => FeatureOutcome::Failed(e.to_string()),
        };
        log_outcome(name, &outcome);
        outcome
    }

    /// Write a boolean feature.
    pub fn set_bool(&mut self, name: FeatureName, value: bool) -> FeatureOutcome {
        let Some(feature) = self.device.feature(name) else {
            tracing::debug!(feature = %name, "Feature not exposed by camera, skipping");
            return FeatureOutcome::Unsupported;
        };
        let outcome = match feature.set_bool(value) {
            Ok(()) => FeatureOutcome::Applied(FeatureValue::Bool(value)),
            Err(e) => FeatureOutcome::Failed(e.to_string()),
        };
        log_outcome(name, &outcome);
        outcome
    }

    /// Write a float feature, clamped to the range the device reports now.
    pub fn set_clamped_float(&mut self, name: FeatureName, value: f64) -> FeatureOutcome {
        let Some(feature) = self.device.feature(name) else {
            tracing::debug!(feature = %name, "Feature not exposed by camera, skipping");
            return FeatureOutcome::Unsupported;
        };

        let outcome = match feature.float_range() {
            Err(e) => FeatureOutcome::Failed(e.to_string()),
            Ok((lo, hi)) => match clamp_to_range(value, lo, hi) {
                None => FeatureOutcome::Failed(format!(
                    "cannot clamp {value} into [{lo}, {hi}]"
                )),
                Some(clamped) => {
                    if clamped != value {
                        tracing::debug!(
                            feature = %name,
                            requested = value,
                            applied = clamped,
                            lo,
                            hi,
                            "Clamped feature value to device range"
                        );
                    }
                    match feature.set_float(clamped) {
                        Ok(()) => FeatureOutcome::Applied(FeatureValue::Float(clamped)),
                        Err(e) => FeatureOutcome::Failed(e.to_string()),
                    }
                }
            },
        };
        log_outcome(name, &outcome);
        outcome
    }

    /// Switch the pixel format. Failure leaves conversion to the pipeline.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> FeatureOutcome {
        match self.device.set_pixel_format(format) {
            Ok(()) => {
                tracing::debug!(%format, "Pixel format set");
                FeatureOutcome::Applied(FeatureValue::Enum(format.as_str().to_string()))
            }
            Err(e) => {
                tracing::info!(
                    %format,
                    error = %e,
                    "Camera refused pixel format, frames will be converted"
                );
                FeatureOutcome::Failed(e.to_string())
            }
        }
    }

    /// Read a feature's current value, if the device exposes it.
    pub fn get(&mut self, name: FeatureName) -> Option<FeatureValue> {
        let feature = self.device.feature(name)?;
        match feature.value() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(feature = %name, error = %e, "Feature read failed");
                None
            }
        }
    }
}

fn log_outcome(name: FeatureName, outcome: &FeatureOutcome) {
    match outcome {
        FeatureOutcome::Applied(value) => {
            tracing::trace!(feature = %name, ?value, "Feature applied");
        }
        FeatureOutcome::Failed(reason) => {
            tracing::warn!(feature = %name, %reason, "Feature write failed, ignoring");
        }
        FeatureOutcome::Unsupported => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockCamera;
    use tracing_test::traced_test;

    #[test]
    fn clamp_handles_bounds_and_nan() {
        assert_eq!(clamp_to_range(50_000.0, 100.0, 30_000.0), Some(30_000.0));
        assert_eq!(clamp_to_range(10.0, 100.0, 30_000.0), Some(100.0));
        assert_eq!(clamp_to_range(500.0, 100.0, 30_000.0), Some(500.0));
        assert_eq!(clamp_to_range(f64::NAN, 0.0, 1.0), None);
        assert_eq!(clamp_to_range(0.5, 1.0, 0.0), None);
    }

    #[test]
    fn auto_modes_parse_their_own_names() {
        for mode in [ExposureAuto::Off, ExposureAuto::Once, ExposureAuto::Continuous] {
            assert_eq!(mode.as_str().parse::<ExposureAuto>(), Ok(mode));
        }
        assert_eq!("Off".parse::<GainAuto>(), Ok(GainAuto::Off));
        assert!("Once".parse::<GainAuto>().is_err());
    }

    #[test]
    fn float_writes_clamp_to_device_range() {
        let camera = MockCamera::new("cam0", 16, 16)
            .with_float_range(FeatureName::ExposureTime, 100.0, 30_000.0);
        let mut device = camera.open_handle();
        let mut gateway = FeatureGateway::new(device.as_mut());

        let outcome = gateway.set_clamped_float(FeatureName::ExposureTime, 50_000.0);
        assert_eq!(outcome, FeatureOutcome::Applied(FeatureValue::Float(30_000.0)));
        assert_eq!(
            gateway.get(FeatureName::ExposureTime),
            Some(FeatureValue::Float(30_000.0))
        );

        let outcome = gateway.set_clamped_float(FeatureName::ExposureTime, -5.0);
        assert_eq!(outcome, FeatureOutcome::Applied(FeatureValue::Float(100.0)));
    }

    #[test]
    fn missing_feature_is_unsupported_without_side_effects() {
        let camera = MockCamera::new("cam0", 16, 16).without_feature(FeatureName::Gain);
        let mut device = camera.open_handle();
        let mut gateway = FeatureGateway::new(device.as_mut());

        assert_eq!(
            gateway.set_clamped_float(FeatureName::Gain, 3.0),
            FeatureOutcome::Unsupported
        );
        assert_eq!(gateway.get(FeatureName::Gain), None);
        assert!(camera.writes().is_empty());
    }

    #[test]
    #[traced_test]
    fn rejected_entry_is_reported_not_raised() {
        let camera = MockCamera::new("cam0", 16, 16);
        let mut device = camera.open_handle();
        let mut gateway = FeatureGateway::new(device.as_mut());

        let outcome = gateway.set_enum(FeatureName::GainAuto, "Once");
        assert!(matches!(outcome, FeatureOutcome::Failed(_)));
        assert_eq!(
            gateway.get(FeatureName::GainAuto),
            Some(FeatureValue::Enum("Off".into()))
        );
        assert!(logs_contain("Feature write failed, ignoring"));
    }

    #[test]
    fn wrong_kind_write_fails_softly() {
        let camera = MockCamera::new("cam0", 16, 16);
        let mut device = camera.open_handle();
        let mut gateway = FeatureGateway::new(device.as_mut());

        assert!(matches!(
            gateway.set_bool(FeatureName::ExposureTime, true),
            FeatureOutcome::Failed(_)
        ));
    }
}
