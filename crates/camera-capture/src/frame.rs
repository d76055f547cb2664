//! Raw camera frames and color conversion

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::CameraError;

/// Pixel format of a raw camera buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane, then interleaved V/U (Android camera default)
    Nv21,
    /// Y plane, then interleaved U/V
    Nv12,
    /// Y plane, U plane, V plane
    I420,
    /// Packed RGB, 3 bytes per pixel
    Rgb24,
}

/// Clockwise rotation that brings the sensor image upright
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation in degrees. Any multiple of 90 is accepted,
    /// negative values and full turns are folded into 0..360.
    pub fn from_degrees(degrees: i32) -> Result<Self, CameraError> {
        if degrees % 90 != 0 {
            return Err(CameraError::Format(format!(
                "rotation must be a multiple of 90 degrees, got {}",
                degrees
            )));
        }
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            _ => Ok(Rotation::Deg270),
        }
    }

    /// Rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether applying this rotation exchanges width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// One camera capture as delivered by the host
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel data in `format` layout
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Buffer layout
    pub format: PixelFormat,
    /// Rotation to apply before analysis
    pub rotation: Rotation,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl RawFrame {
    /// Create a new raw frame. The buffer is not checked until [`RawFrame::validate`].
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        rotation: Rotation,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            rotation,
            timestamp_ns: 0,
            sequence: 0,
        }
    }

    /// Attach capture metadata
    pub fn with_sequence(mut self, sequence: u32, timestamp_ns: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Exact buffer length for a frame of the given format and size
    pub fn expected_len(format: PixelFormat, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        match format {
            PixelFormat::Rgb24 => luma * 3,
            PixelFormat::Nv21 | PixelFormat::Nv12 | PixelFormat::I420 => {
                let (cw, ch) = chroma_dims(width, height);
                luma + 2 * cw * ch
            }
        }
    }

    /// Check dimensions and buffer length
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let expected = Self::expected_len(self.format, self.width, self.height);
        if self.data.len() != expected {
            return Err(CameraError::Format(format!(
                "{:?} {}x{} needs {} bytes, got {}",
                self.format,
                self.width,
                self.height,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Decode into an interleaved RGB bitmap (BT.601, full range)
    pub fn to_rgb(&self) -> Result<RgbImage, CameraError> {
        self.validate()?;
        trace!(
            "Decoding {:?} frame {} ({}x{})",
            self.format,
            self.sequence,
            self.width,
            self.height
        );

        if self.format == PixelFormat::Rgb24 {
            return RgbImage::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| CameraError::Decode("RGB buffer does not fit frame".into()));
        }

        let w = self.width as usize;
        let luma_len = w * self.height as usize;
        let (cw, ch) = chroma_dims(self.width, self.height);
        let data = &self.data;
        let format = self.format;

        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let luma = data[y * w + x];
            let chroma = (y / 2) * cw + x / 2;
            let (u, v) = match format {
                PixelFormat::Nv21 => {
                    let idx = luma_len + 2 * chroma;
                    (data[idx + 1], data[idx])
                }
                PixelFormat::Nv12 => {
                    let idx = luma_len + 2 * chroma;
                    (data[idx], data[idx + 1])
                }
                PixelFormat::I420 | PixelFormat::Rgb24 => {
                    (data[luma_len + chroma], data[luma_len + cw * ch + chroma])
                }
            };
            Rgb(yuv_to_rgb(luma, u, v))
        }))
    }
}

/// Chroma plane dimensions for 4:2:0 subsampling
fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// BT.601 full-range YUV to RGB
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}
