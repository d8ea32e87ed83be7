//! Custom error types for the rig core.
//!
//! Two layers, both built with `thiserror`:
//!
//! - **`DeviceError`**: what a camera driver reports for a single call (a feature
//!   write, a range query, starting the stream). Feature-level device errors are
//!   swallowed by the feature gateway; handle-level ones are lifted into
//!   [`RigError::DeviceCallFailed`].
//! - **`RigError`**: the crate-wide error. Session-fatal camera failures end up as
//!   the message of a `CameraEvent::Error`; serial failures are returned to the
//!   caller and mirrored in the link's status string.
//!
//! `anyhow` is only used at the binary edge.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type RigResult<T> = std::result::Result<T, RigError>;

/// Error reported by a camera driver for one call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The driver rejected the call.
    #[error("{operation} failed: {message}")]
    Call {
        /// Driver operation that failed (e.g. `"start_streaming"`).
        operation: &'static str,
        /// Driver supplied detail.
        message: String,
    },

    /// The feature exists but does not accept this kind of value.
    #[error("feature {feature} does not accept {kind} values")]
    WrongKind {
        /// Feature name as the device knows it.
        feature: &'static str,
        /// Value kind that was attempted.
        kind: &'static str,
    },

    /// Enumeration entry not offered by the device.
    #[error("feature {feature} has no entry '{entry}'")]
    InvalidEntry {
        /// Feature name as the device knows it.
        feature: &'static str,
        /// Rejected entry.
        entry: String,
    },

    /// Pixel format not offered by the device.
    #[error("pixel format {0} is not supported by this camera")]
    UnsupportedPixelFormat(String),

    /// No device with the requested identifier.
    #[error("camera '{0}' not found")]
    UnknownCamera(String),
}

impl DeviceError {
    /// Shorthand for [`DeviceError::Call`].
    pub fn call(operation: &'static str, message: impl Into<String>) -> Self {
        DeviceError::Call {
            operation,
            message: message.into(),
        }
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum RigError {
    /// Enumeration returned no cameras.
    #[error("No camera found.")]
    NoDeviceFound,

    /// A driver call failed during enumeration, open, start or stop.
    #[error("{operation} failed: {source}")]
    DeviceCallFailed {
        operation: &'static str,
        #[source]
        source: DeviceError,
    },

    /// A frame could not be converted to Mono8.
    #[error("Frame conversion failed: {0}")]
    ConversionFailed(String),

    /// Frame geometry does not fit its buffer.
    #[error("Invalid frame geometry: {0}")]
    InvalidFrame(String),

    #[error("Failed to open serial port {port}: {reason}")]
    SerialOpenFailed { port: String, reason: String },

    /// Write or flush on the open port failed.
    #[error("Serial write failed: {0}")]
    SerialWriteFailed(String),

    /// A write was attempted without an open port.
    #[error("Serial port not connected")]
    SerialPortNotConnected,

    /// Built without `instrument_serial`.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// Optical channel index out of range.
    #[error("Unknown optical channel index {0}")]
    UnknownChannel(usize),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The tracing subscriber could not be installed.
    #[error("Logging initialization failed: {0}")]
    Logging(String),

    /// Image encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RigError {
    /// Lift a driver error from a handle-level call into a session-fatal error.
    pub fn device(operation: &'static str, source: DeviceError) -> Self {
        RigError::DeviceCallFailed { operation, source }
    }

    /// Whether the camera session can keep running after this error.
    ///
    /// Serial and per-frame failures never end a camera session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            RigError::NoDeviceFound | RigError::DeviceCallFailed { .. }
        )
    }
}

impl From<figment::Error> for RigError {
    fn from(value: figment::Error) -> Self {
        RigError::Config(Box::new(value))
    }
}
