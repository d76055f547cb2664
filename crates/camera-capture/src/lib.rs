//! Camera Capture Types for the Lane Pipeline
//!
//! Describes the frames a host camera layer hands to the lane pipeline:
//! - Planar 4:2:0 YUV buffers (NV21, NV12, I420) and packed RGB
//! - Sensor rotation metadata (0/90/180/270 degrees)
//! - Decoding into interleaved RGB bitmaps

pub mod frame;

pub use frame::{PixelFormat, RawFrame, Rotation};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Decode failed: {0}")]
    Decode(String),
}
