//! # Scope Rig Core Library
//!
//! Headless core of a microscope imaging rig: a live camera feed with exposure,
//! gain and gamma control, plus a serial-connected optical channel selector.
//! A UI (or the bundled CLI) consumes events and issues commands; nothing here
//! depends on a GUI toolkit.
//!
//! ## Crate Structure
//!
//! - **`camera`**: camera sessions. The acquisition thread owns the device
//!   handle, applies queued control requests through a best-effort feature
//!   gateway and turns driver frames into owned Mono8 frames delivered as
//!   [`camera::CameraEvent`]s. Includes the driver traits and a simulated
//!   camera.
//! - **`serial`**: the serial link. Port enumeration, open/close, writes,
//!   received-data events and optical channel commands.
//! - **`config`**: Figment-based configuration (TOML file + environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: `RigError` / `DeviceError`.

pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod serial;

pub use camera::{CameraEvent, CameraSession, OwnedFrame, SessionState};
pub use error::{RigError, RigResult};
pub use serial::{SerialEvent, SerialLink};
