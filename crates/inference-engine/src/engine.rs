//! Inference Adapter Implementation

use std::time::Instant;

use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::SegmentationBackend;
use crate::buffer::ProbabilityBuffer;
use crate::InferenceError;

/// Numeric range of the input tensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputNormalization {
    /// Channel values 0.0..=255.0
    #[default]
    Raw,
    /// Channel values 0.0..=1.0
    UnitRange,
}

impl InputNormalization {
    fn scale(&self) -> f32 {
        match self {
            InputNormalization::Raw => 1.0,
            InputNormalization::UnitRange => 1.0 / 255.0,
        }
    }
}

/// When the model is loaded and released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLifecycle {
    /// Load in `initialize`, release in `release`
    #[default]
    Persistent,
    /// Load before and release after every inference
    PerFrame,
}

/// Owns a segmentation backend and enforces the tensor contract around it
pub struct InferenceAdapter {
    backend: Box<dyn SegmentationBackend>,
    lifecycle: ModelLifecycle,
    normalization: InputNormalization,
    width: u32,
    height: u32,
    initialized: bool,
}

impl InferenceAdapter {
    /// Create an adapter for a model taking `width`x`height` RGB images
    pub fn new(
        backend: Box<dyn SegmentationBackend>,
        width: u32,
        height: u32,
        lifecycle: ModelLifecycle,
        normalization: InputNormalization,
    ) -> Self {
        info!(
            "Creating inference adapter: backend={}, input={}x{}, lifecycle={:?}",
            backend.name(),
            width,
            height,
            lifecycle
        );
        Self {
            backend,
            lifecycle,
            normalization,
            width,
            height,
            initialized: false,
        }
    }

    /// Prepare the adapter before the first frame
    pub fn initialize(&mut self) -> Result<(), InferenceError> {
        if self.lifecycle == ModelLifecycle::Persistent {
            self.backend.load()?;
        }
        self.initialized = true;
        info!("Inference adapter ready ({})", self.backend.name());
        Ok(())
    }

    /// Run the classifier on one prepared image
    pub fn run(&mut self, image: &RgbImage) -> Result<ProbabilityBuffer, InferenceError> {
        if !self.initialized {
            return Err(InferenceError::NotInitialized);
        }

        let (w, h) = image.dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{}x{}", self.width, self.height),
                actual: format!("{}x{}", w, h),
            });
        }

        let start = Instant::now();
        let input = self.to_tensor(image);

        let output = match self.lifecycle {
            ModelLifecycle::Persistent => self.backend.infer(&input),
            ModelLifecycle::PerFrame => {
                self.backend.load()?;
                let output = self.backend.infer(&input);
                self.backend.unload();
                output
            }
        }?;
        drop(input);

        let buffer = ProbabilityBuffer::new(output, self.width, self.height)?;
        debug!("Inference completed in {:?}", start.elapsed());
        Ok(buffer)
    }

    /// Pack an RGB image into a (1, H, W, 3) tensor
    fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let scale = self.normalization.scale();
        Array4::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, c)| image.get_pixel(x as u32, y as u32)[c] as f32 * scale,
        )
    }

    /// Free model resources. Safe to call more than once.
    pub fn release(&mut self) {
        if self.backend.is_loaded() {
            self.backend.unload();
            info!("Inference adapter released ({})", self.backend.name());
        }
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn lifecycle(&self) -> ModelLifecycle {
        self.lifecycle
    }

    /// Expected input dimensions (width, height)
    pub fn input_dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for InferenceAdapter {
    fn drop(&mut self) {
        if self.backend.is_loaded() {
            warn!("Inference adapter dropped without release, unloading model");
            self.backend.unload();
        }
    }
}
