//! Lane Departure Estimation
//!
//! Per-frame road camera analysis:
//! - Frame preparation (decode, rotate, bilinear resize to the model input)
//! - Lane segmentation through the inference adapter
//! - Binary lane mask and boundary sampling on a fixed scan row
//! - Departure classification against a reference anchor
//! - Latest-value result delivery to the display

pub mod config;
pub mod departure;
pub mod mask;
pub mod pipeline;
pub mod preprocess;
pub mod worker;

pub use config::LaneConfig;
pub use departure::{Classification, DepartureClassifier, DepartureLabel};
pub use mask::{BoundaryPoints, LaneScan, MaskBuilder};
pub use pipeline::{DepartureResult, LanePipeline, PipelineStats};
pub use preprocess::{FramePreprocessor, PreparedImage};
pub use worker::FrameWorker;

pub use camera_capture::{PixelFormat, RawFrame, Rotation};
pub use inference_engine::{InferenceAdapter, InputNormalization, ModelLifecycle};
pub use result_channel::Subscription;

use camera_capture::CameraError;
use inference_engine::InferenceError;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lane pipeline error types
#[derive(Error, Debug)]
pub enum LaneError {
    #[error("Image preparation failed: {0}")]
    ImagePreparation(String),

    #[error("Invalid prepared image size: {width}x{height} [should be: {expected_width}x{expected_height}]")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl LaneError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            LaneError::ImagePreparation(_) => "image_preparation",
            LaneError::SizeMismatch { .. } => "size_mismatch",
            LaneError::Inference(_) => "inference",
            LaneError::Config(_) => "config",
            LaneError::Worker(_) => "worker",
        }
    }
}

impl From<CameraError> for LaneError {
    fn from(err: CameraError) -> Self {
        LaneError::ImagePreparation(err.to_string())
    }
}

/// Initialize logging. `RUST_LOG` overrides the default INFO level.
/// Leaves an already installed subscriber in place.
pub fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_camera_error_is_preparation_error() {
        let err: LaneError = CameraError::Format("odd".into()).into();
        assert_eq!(err.reason(), "image_preparation");
    }
}
