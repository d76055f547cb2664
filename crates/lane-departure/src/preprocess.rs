//! Frame preparation for the segmentation model

use camera_capture::{RawFrame, Rotation};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::trace;

use crate::{LaneConfig, LaneError};

/// RGB image ready for the inference adapter
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    image: RgbImage,
}

impl PreparedImage {
    /// Wrap an image that was prepared elsewhere. Size is checked by the pipeline.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Decodes, rotates and resizes camera frames to the model input size
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    width: u32,
    height: u32,
}

impl FramePreprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_config(config: &LaneConfig) -> Self {
        Self::new(config.input_width, config.input_height)
    }

    /// Produce a `width`x`height` RGB image from a raw frame
    pub fn prepare(&self, frame: &RawFrame) -> Result<PreparedImage, LaneError> {
        let decoded = frame.to_rgb()?;
        let upright = rotate(decoded, frame.rotation);
        trace!(
            "Frame {} upright at {}x{}",
            frame.sequence,
            upright.width(),
            upright.height()
        );

        let resized = imageops::resize(&upright, self.width, self.height, FilterType::Triangle);
        drop(upright);

        Ok(PreparedImage::from_rgb(resized))
    }
}

/// Rotate clockwise, consuming the source bitmap
fn rotate(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    }
}
