//! Consumer-side frame display.
//!
//! Turns delivered [`OwnedFrame`]s into `image::GrayImage`s for a viewer,
//! optionally histogram-equalized, and keeps the last one for snapshots.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{GrayImage, ImageBuffer, ImageEncoder};

use crate::camera::enhance::equalize_histogram;
use crate::camera::pipeline::OwnedFrame;
use crate::error::{RigError, RigResult};

/// Latest displayable image plus the enhancement toggle.
#[derive(Debug, Default)]
pub struct FrameDisplay {
    enhance_contrast: bool,
    last_image: Option<GrayImage>,
    frames_shown: u64,
}

impl FrameDisplay {
    /// An empty display.
    pub fn new(enhance_contrast: bool) -> Self {
        Self {
            enhance_contrast,
            ..Self::default()
        }
    }

    /// Whether frames are equalized before display.
    pub fn enhance_contrast(&self) -> bool {
        self.enhance_contrast
    }

    /// Applies from the next frame on.
    pub fn set_enhance_contrast(&mut self, enabled: bool) {
        self.enhance_contrast = enabled;
    }

    /// Most recent image, if any frame has been shown.
    pub fn last_image(&self) -> Option<&GrayImage> {
        self.last_image.as_ref()
    }

    /// Frames rendered so far.
    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Render a frame and keep it as the current image.
    ///
    /// # Errors
    ///
    /// [`RigError::InvalidFrame`] if no image can be built from the pixels.
    pub fn on_frame(&mut self, frame: &OwnedFrame) -> RigResult<&GrayImage> {
        let source = if self.enhance_contrast {
            equalize_histogram(frame)
        } else {
            frame.clone()
        };
        let image = to_gray_image(&source)?;
        self.frames_shown += 1;
        Ok(self.last_image.insert(image))
    }

    /// Write the current image as `snapshot_<timestamp>.png` inside `dir`.
    ///
    /// # Errors
    ///
    /// Fails when nothing has been shown yet or the file cannot be written.
    pub fn save_snapshot(&self, dir: &Path) -> RigResult<PathBuf> {
        let image = self
            .last_image
            .as_ref()
            .ok_or_else(|| RigError::InvalidFrame("no frame to save yet".into()))?;

        fs::create_dir_all(dir)?;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("snapshot_{timestamp}.png"));

        let writer = BufWriter::new(File::create(&path)?);
        PngEncoder::new(writer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )?;

        tracing::info!(
            path = ?path,
            dimensions = format!("{}x{}", image.width(), image.height()),
            "Saved snapshot"
        );
        Ok(path)
    }
}

/// Unpack a frame into a `GrayImage`, dropping row padding.
pub fn to_gray_image(frame: &OwnedFrame) -> RigResult<GrayImage> {
    let (width, height) = (frame.width(), frame.height());
    ImageBuffer::from_raw(width, height, frame.to_packed()).ok_or_else(|| {
        RigError::InvalidFrame(format!("cannot build {width}x{height} image from frame"))
    })
}
