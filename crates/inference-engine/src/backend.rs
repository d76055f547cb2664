//! Segmentation model backends

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array4;
use tracing::{debug, error, info};
use tract_onnx::prelude::*;

use crate::InferenceError;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A pixel-wise classifier the adapter can drive.
///
/// `infer` receives an NHWC tensor and returns the flattened single-channel
/// output. Implementations must tolerate repeated `load`/`unload` cycles.
pub trait SegmentationBackend: Send {
    fn load(&mut self) -> Result<(), InferenceError>;

    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    fn unload(&mut self);

    fn is_loaded(&self) -> bool;

    fn name(&self) -> &str;
}

/// ONNX model executed with tract
pub struct OnnxBackend {
    model_path: PathBuf,
    /// Input shape [1, H, W, 3]
    input_shape: [usize; 4],
    plan: Option<OnnxPlan>,
}

impl OnnxBackend {
    pub fn new(model_path: impl AsRef<Path>, width: u32, height: u32) -> Self {
        let model_path = model_path.as_ref().to_path_buf();
        info!("Creating ONNX backend for model: {}", model_path.display());
        Self {
            model_path,
            input_shape: [1, height as usize, width as usize, 3],
            plan: None,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl SegmentationBackend for OnnxBackend {
    fn load(&mut self) -> Result<(), InferenceError> {
        if self.plan.is_some() {
            return Ok(());
        }

        let plan = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .and_then(|m| m.with_input_fact(0, f32::fact(self.input_shape).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| {
                error!("Failed to load lane model {}: {}", self.model_path.display(), e);
                InferenceError::ModelLoadError(e.to_string())
            })?;

        debug!("Lane model loaded from {}", self.model_path.display());
        self.plan = Some(plan);
        Ok(())
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let plan = self.plan.as_ref().ok_or(InferenceError::NotInitialized)?;

        let data = input.as_slice().ok_or_else(|| {
            InferenceError::InferenceFailed("input tensor is not contiguous".into())
        })?;
        let tensor = Tensor::from_shape(input.shape(), data)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".into()))?;

        first
            .as_slice::<f32>()
            .map(|s| s.to_vec())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))
    }

    fn unload(&mut self) {
        if self.plan.take().is_some() {
            debug!("Lane model released");
        }
    }

    fn is_loaded(&self) -> bool {
        self.plan.is_some()
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

type MockFn = Box<dyn FnMut(&Array4<f32>) -> Vec<f32> + Send>;

/// Shared load/unload/infer counters of a [`MockBackend`]
#[derive(Debug, Clone, Default)]
pub struct MockCounters {
    loads: Arc<AtomicUsize>,
    unloads: Arc<AtomicUsize>,
    inferences: Arc<AtomicUsize>,
}

impl MockCounters {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::Relaxed)
    }

    pub fn inferences(&self) -> usize {
        self.inferences.load(Ordering::Relaxed)
    }
}

/// Backend producing synthetic probability maps (no model file needed)
pub struct MockBackend {
    generate: MockFn,
    loaded: bool,
    fail_inference: bool,
    counters: MockCounters,
}

impl MockBackend {
    /// Mock whose output is computed from the input tensor
    pub fn from_fn(f: impl FnMut(&Array4<f32>) -> Vec<f32> + Send + 'static) -> Self {
        Self {
            generate: Box::new(f),
            loaded: false,
            fail_inference: false,
            counters: MockCounters::default(),
        }
    }

    /// Mock that always returns the same probability map
    pub fn from_map(map: Vec<f32>) -> Self {
        Self::from_fn(move |_| map.clone())
    }

    /// Mock that returns `value` for every pixel of a `width`x`height` map
    pub fn constant(value: f32, width: u32, height: u32) -> Self {
        Self::from_map(vec![value; width as usize * height as usize])
    }

    /// Make every inference fail
    pub fn failing(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn counters(&self) -> MockCounters {
        self.counters.clone()
    }
}

impl SegmentationBackend for MockBackend {
    fn load(&mut self) -> Result<(), InferenceError> {
        self.loaded = true;
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if !self.loaded {
            return Err(InferenceError::NotInitialized);
        }
        self.counters.inferences.fetch_add(1, Ordering::Relaxed);
        if self.fail_inference {
            return Err(InferenceError::InferenceFailed("mock failure".into()));
        }
        Ok((self.generate)(input))
    }

    fn unload(&mut self) {
        if self.loaded {
            self.loaded = false;
            self.counters.unloads.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn name(&self) -> &str {
        "mock"
    }
}
