//! Configuration using Figment
//!
//! Configuration is layered:
//! 1. built-in defaults (every key is optional)
//! 2. `config/scope_rig.toml` (or an explicit path)
//! 3. environment variables prefixed with `SCOPE_RIG_`, with `__` between
//!    section and key, e.g. `SCOPE_RIG_CAMERA__POLL_INTERVAL_MS=5`
//!
//! # Example
//! ```no_run
//! use scope_rig::config::RigConfig;
//!
//! let config = RigConfig::load()?;
//! config.validate()?;
//! println!("Camera: {:?}", config.camera.camera_id);
//! # Ok::<(), scope_rig::error::RigError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::camera::{AcquisitionConfig, ExposureAuto, GainAuto, PixelFormat};
use crate::error::{RigError, RigResult};
use crate::serial::SerialSettings;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/scope_rig.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SCOPE_RIG_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// `[application]`
    pub application: ApplicationConfig,
    /// `[camera]`
    pub camera: CameraConfig,
    /// `[controls]`
    pub controls: ControlsConfig,
    /// `[serial]`
    pub serial: SerialConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Scope Rig".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Camera session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Preferred camera ID; the first camera is used when absent or not found
    pub camera_id: Option<String>,
    /// Upper bound on the acquisition loop wait, in milliseconds
    pub poll_interval_ms: u64,
    /// Pixel format requested during bring-up
    pub pixel_format: PixelFormat,
    /// Histogram-equalize frames before display
    pub enhance_contrast: bool,
    /// Where snapshots are written
    pub snapshot_dir: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: None,
            poll_interval_ms: 10,
            pixel_format: PixelFormat::Mono8,
            enhance_contrast: true,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

impl CameraConfig {
    /// `poll_interval_ms` as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Session settings for [`crate::camera::CameraSession`].
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval: self.poll_interval(),
            pixel_format: self.pixel_format,
        }
    }
}

/// Initial control panel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Exposure mode (Off, Once, Continuous)
    pub exposure_auto: ExposureAuto,
    /// Manual exposure in microseconds
    pub exposure_time_us: f64,
    /// Gain mode (Off, Continuous)
    pub gain_auto: GainAuto,
    /// Manual gain in dB
    pub gain_db: f64,
    /// Gamma correction
    pub gamma_enable: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            exposure_auto: ExposureAuto::Continuous,
            exposure_time_us: 10_000.0,
            gain_auto: GainAuto::Continuous,
            gain_db: 0.0,
            gamma_enable: false,
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name or system location to connect to
    pub port: Option<String>,
    /// Line speed
    pub baud_rate: u32,
    /// Reader poll timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let settings = SerialSettings::default();
        Self {
            port: None,
            baud_rate: settings.baud_rate,
            read_timeout_ms: settings.read_timeout.as_millis() as u64,
            write_timeout_ms: settings.write_timeout.as_millis() as u64,
        }
    }
}

impl SerialConfig {
    /// Line settings for [`crate::serial::SerialLink`].
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

impl RigConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> RigResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment. A missing file leaves
    /// the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RigResult<Self> {
        let config: Self = Self::figment(path.as_ref())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        tracing::debug!(path = ?path.as_ref(), "Configuration loaded");
        Ok(config)
    }

    /// Defaults merged with a TOML file, without environment overrides.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RigConfig::default())).merge(Toml::file(path))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> RigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(RigError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.camera.poll_interval_ms == 0 {
            return Err(RigError::Configuration(
                "camera.poll_interval_ms must be positive".into(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(RigError::Configuration("serial.baud_rate must be positive".into()));
        }

        if self.serial.read_timeout_ms == 0 || self.serial.write_timeout_ms == 0 {
            return Err(RigError::Configuration(
                "serial timeouts must be positive".into(),
            ));
        }

        for (name, value) in [
            ("controls.exposure_time_us", self.controls.exposure_time_us),
            ("controls.gain_db", self.controls.gain_db),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RigError::Configuration(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn extract(path: &Path) -> RigConfig {
        RigConfig::figment(path).extract().unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = RigConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.camera.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.controls.exposure_auto, ExposureAuto::Continuous);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = extract(&dir.path().join("absent.toml"));
        assert_eq!(config, RigConfig::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let file = write_config(
            r#"
            [camera]
            camera_id = "DEV_1AB22C00"
            pixel_format = "BayerRG8"
            poll_interval_ms = 25

            [controls]
            exposure_auto = "Off"
            exposure_time_us = 2500.0

            [serial]
            port = "/dev/ttyUSB0"
            "#,
        );
        let config = extract(file.path());

        assert_eq!(config.camera.camera_id.as_deref(), Some("DEV_1AB22C00"));
        assert_eq!(config.camera.pixel_format, PixelFormat::BayerRG8);
        assert_eq!(config.camera.acquisition().poll_interval, Duration::from_millis(25));
        assert!(config.camera.enhance_contrast);
        assert_eq!(config.controls.exposure_auto, ExposureAuto::Off);
        assert_eq!(config.controls.gain_auto, GainAuto::Continuous);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.settings().baud_rate, 115_200);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RigConfig::default();
        config.application.log_level = "verbose".into();
        assert!(matches!(config.validate(), Err(RigError::Configuration(_))));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = RigConfig::default();
        config.camera.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_value_is_a_config_error() {
        let file = write_config("[serial]\nbaud_rate = \"fast\"\n");
        let err = RigConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, RigError::Config(_)));
    }
}
