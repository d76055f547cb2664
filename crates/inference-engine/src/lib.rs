//! Lane Segmentation Inference
//!
//! Wraps the pixel-wise lane classifier behind a narrow contract:
//! one RGB image of shape (1, H, W, 3) in, one probability per pixel out.

mod backend;
mod buffer;
mod engine;

pub use backend::{MockBackend, MockCounters, OnnxBackend, SegmentationBackend};
pub use buffer::ProbabilityBuffer;
pub use engine::{InferenceAdapter, InputNormalization, ModelLifecycle};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Invalid output shape: expected {expected} values, got {actual}")]
    InvalidOutputShape { expected: usize, actual: usize },
    #[error("Model not initialized")]
    NotInitialized,
}
