//! Camera Driver Abstractions
//!
//! The seam between the acquisition core and a vendor SDK binding. A driver
//! provides:
//!
//! - [`CameraSystem`]: enumeration and opening of devices (shared, thread-safe)
//! - [`CameraDevice`]: one opened device handle, owned by the acquisition thread
//! - [`FeatureAccess`]: typed access to one named feature of that handle
//! - [`FrameLease`]: a driver-owned frame lent to the frame callback
//!
//! Feature lookup is an explicit `FeatureName -> Option<&mut dyn FeatureAccess>`
//! mapping; a device that lacks a feature returns `None`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

// =============================================================================
// Pixel Formats
// =============================================================================

/// Pixel layouts a driver may deliver.
///
/// `Mono8` is the canonical format of the pipeline; everything else is
/// converted before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit monochrome (canonical).
    Mono8,
    /// 10-bit monochrome in little-endian 16-bit containers.
    Mono10,
    /// 12-bit monochrome in little-endian 16-bit containers.
    Mono12,
    /// 16-bit monochrome, little-endian.
    Mono16,
    /// 8-bit Bayer mosaic, RGGB.
    BayerRG8,
    /// 8-bit Bayer mosaic, GRBG.
    BayerGR8,
    /// 8-bit Bayer mosaic, GBRG.
    BayerGB8,
    /// 8-bit Bayer mosaic, BGGR.
    BayerBG8,
    /// Packed 24-bit RGB.
    Rgb8,
    /// Packed 24-bit BGR.
    Bgr8,
    /// YUV 4:2:2 packed as `Y0 U Y1 V`.
    Yuv422,
    /// 12-bit monochrome packed two pixels per three bytes.
    Mono12Packed,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in a row, for formats with a whole number.
    ///
    /// `None` for packed formats the pipeline cannot address per pixel.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Mono8
            | PixelFormat::BayerRG8
            | PixelFormat::BayerGR8
            | PixelFormat::BayerGB8
            | PixelFormat::BayerBG8 => Some(1),
            PixelFormat::Mono10
            | PixelFormat::Mono12
            | PixelFormat::Mono16
            | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(3),
            PixelFormat::Mono12Packed => None,
        }
    }

    /// Whether frames in this format can be delivered without conversion.
    pub fn is_canonical(self) -> bool {
        self == PixelFormat::Mono8
    }

    /// Name as used by GenICam style feature trees.
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono10 => "Mono10",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::BayerRG8 => "BayerRG8",
            PixelFormat::BayerGR8 => "BayerGR8",
            PixelFormat::BayerGB8 => "BayerGB8",
            PixelFormat::BayerBG8 => "BayerBG8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Yuv422 => "YUV422_8",
            PixelFormat::Mono12Packed => "Mono12Packed",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Features
// =============================================================================

/// Device features the rig knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureName {
    /// `AcquisitionMode` enumeration (Continuous, SingleFrame, ...).
    AcquisitionMode,
    /// `ExposureAuto` enumeration.
    ExposureAuto,
    /// `ExposureTime` in microseconds.
    ExposureTime,
    /// `GainAuto` enumeration.
    GainAuto,
    /// `Gain` in dB.
    Gain,
    /// `GammaEnable` boolean.
    GammaEnable,
    /// `BlackLevel` float.
    BlackLevel,
}

impl FeatureName {
    /// Every feature, in bring-up order.
    pub const ALL: [FeatureName; 7] = [
        FeatureName::AcquisitionMode,
        FeatureName::ExposureAuto,
        FeatureName::ExposureTime,
        FeatureName::GainAuto,
        FeatureName::Gain,
        FeatureName::GammaEnable,
        FeatureName::BlackLevel,
    ];

    /// SFNC name of the feature.
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::AcquisitionMode => "AcquisitionMode",
            FeatureName::ExposureAuto => "ExposureAuto",
            FeatureName::ExposureTime => "ExposureTime",
            FeatureName::GainAuto => "GainAuto",
            FeatureName::Gain => "Gain",
            FeatureName::GammaEnable => "GammaEnable",
            FeatureName::BlackLevel => "BlackLevel",
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Selected enumeration entry.
    Enum(String),
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f64),
}

/// Typed access to one feature of an open device.
///
/// Implementations report every failure as a [`DeviceError`]; the gateway
/// decides what is fatal.
pub trait FeatureAccess {
    /// Select an enumeration entry by name.
    fn set_enum(&mut self, entry: &str) -> Result<(), DeviceError>;

    /// Write a boolean feature.
    fn set_bool(&mut self, value: bool) -> Result<(), DeviceError>;

    /// Write a float feature. The caller is responsible for range checks.
    fn set_float(&mut self, value: f64) -> Result<(), DeviceError>;

    /// Inclusive `(lo, hi)` range currently reported for a float feature.
    fn float_range(&self) -> Result<(f64, f64), DeviceError>;

    /// Read back the current value.
    fn value(&self) -> Result<FeatureValue, DeviceError>;
}

// =============================================================================
// Frames
// =============================================================================

/// A frame lent by the driver to the frame callback.
///
/// The backing memory belongs to the driver. It must be handed back with
/// [`FrameLease::requeue`] exactly once, after which the driver may reuse it.
pub trait FrameLease: Send {
    /// Layout of the pixel data.
    fn pixel_format(&self) -> PixelFormat;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Bytes per row, including driver padding.
    fn stride(&self) -> usize;

    /// Raw pixel bytes.
    fn data(&self) -> &[u8];

    /// Return the buffer to the driver's free pool.
    fn requeue(self: Box<Self>);
}

/// Callback invoked by the driver for every captured frame, possibly on a
/// driver-internal thread.
pub type FrameHandler = Box<dyn FnMut(Box<dyn FrameLease>) + Send>;

// =============================================================================
// Devices
// =============================================================================

/// Identity of an enumerated camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    /// Driver-unique identifier used for selection.
    pub id: String,
    /// Human readable model name.
    pub model: String,
}

/// An open camera. Not `Sync`: exactly one thread drives it.
pub trait CameraDevice: Send {
    /// Identifier this handle was opened with.
    fn id(&self) -> &str;

    /// Resolve a feature. `None` when the device does not expose it.
    fn feature(&mut self, name: FeatureName) -> Option<&mut dyn FeatureAccess>;

    /// Switch the delivered pixel format.
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), DeviceError>;

    /// Currently configured pixel format.
    fn pixel_format(&self) -> PixelFormat;

    /// Install the frame callback and begin streaming.
    fn start_streaming(&mut self, handler: FrameHandler) -> Result<(), DeviceError>;

    /// Stop streaming and drop the frame callback. After this returns the
    /// callback is no longer invoked.
    fn stop_streaming(&mut self) -> Result<(), DeviceError>;
}

/// Driver entry point: enumerates and opens cameras.
pub trait CameraSystem: Send + Sync {
    /// List attached cameras.
    fn cameras(&self) -> Result<Vec<CameraDescriptor>, DeviceError>;

    /// Open a camera for exclusive use by the caller.
    fn open(&self, id: &str) -> Result<Box<dyn CameraDevice>, DeviceError>;
}
