//! Lane pipeline configuration

use std::path::{Path, PathBuf};

use inference_engine::{
    InferenceAdapter, InputNormalization, MockBackend, ModelLifecycle, OnnxBackend,
    SegmentationBackend,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::LaneError;

/// Environment variable prefix, e.g. `LANE__DETECTION_THRESHOLD=0.6`
pub const ENV_PREFIX: &str = "LANE";

/// Lane pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Segmentation model (ONNX). Without one a blank mock model is used.
    pub model_path: Option<PathBuf>,

    /// Model input width (pixels)
    pub input_width: u32,

    /// Model input height (pixels)
    pub input_height: u32,

    /// Probability at or above which a pixel is lane marking
    pub detection_threshold: f32,

    /// Row sampled for left/right boundaries (model space)
    pub scan_row: u32,

    /// Reference anchor for boundary distances (model space)
    pub anchor_x: u32,
    pub anchor_y: u32,

    /// Input tensor value range
    pub normalization: InputNormalization,

    /// Model load/release policy
    pub lifecycle: ModelLifecycle,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: 80,
            input_height: 160,
            detection_threshold: 0.7,
            scan_row: 120,
            anchor_x: 40,
            anchor_y: 159,
            normalization: InputNormalization::Raw,
            lifecycle: ModelLifecycle::Persistent,
        }
    }
}

impl LaneConfig {
    /// Load from an optional file (format from its extension) overlaid
    /// with `LANE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, LaneError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!("Loading lane config from {}", path.display());
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: LaneConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LaneError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), LaneError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(LaneError::Config(format!(
                "input size must be non-zero, got {}x{}",
                self.input_width, self.input_height
            )));
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold <= 1.0) {
            return Err(LaneError::Config(format!(
                "detection_threshold {} is out of range (0, 1]",
                self.detection_threshold
            )));
        }
        if self.scan_row >= self.input_height {
            return Err(LaneError::Config(format!(
                "scan_row {} is outside input height {}",
                self.scan_row, self.input_height
            )));
        }
        if self.anchor_x >= self.input_width || self.anchor_y >= self.input_height {
            return Err(LaneError::Config(format!(
                "anchor ({}, {}) is outside the {}x{} input",
                self.anchor_x, self.anchor_y, self.input_width, self.input_height
            )));
        }
        Ok(())
    }

    /// Build and initialize the inference adapter described by this config
    pub fn build_adapter(&self) -> Result<InferenceAdapter, LaneError> {
        let backend: Box<dyn SegmentationBackend> = match &self.model_path {
            Some(path) => Box::new(OnnxBackend::new(path, self.input_width, self.input_height)),
            None => {
                warn!("No lane model path configured. Using mock implementation.");
                Box::new(MockBackend::constant(0.0, self.input_width, self.input_height))
            }
        };

        let mut adapter = InferenceAdapter::new(
            backend,
            self.input_width,
            self.input_height,
            self.lifecycle,
            self.normalization,
        );
        adapter.initialize()?;
        Ok(adapter)
    }
}
