//! Per-frame lane departure pipeline

use std::sync::Arc;
use std::time::{Duration, Instant};

use camera_capture::RawFrame;
use image::RgbaImage;
use inference_engine::InferenceAdapter;
use result_channel::{ResultChannel, Subscription};
use tracing::{debug, error, info, warn};

use crate::departure::{Classification, DepartureClassifier, DepartureLabel};
use crate::mask::{rescale_mask, MaskBuilder};
use crate::preprocess::{FramePreprocessor, PreparedImage};
use crate::{LaneConfig, LaneError};

/// Terminal artifact of one processed frame
#[derive(Debug, Clone)]
pub struct DepartureResult {
    /// Lane overlay at camera resolution. `None` means no overlay.
    pub mask: Option<RgbaImage>,
    pub label: DepartureLabel,
    /// Boundary distances behind the label
    pub classification: Classification,
    /// Sequence number of the source frame
    pub sequence: u32,
    /// Time spent on the frame
    pub latency: Duration,
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub dropped: u64,
}

/// Runs preprocess → inference → mask → classification for one frame at a time
pub struct LanePipeline {
    preprocessor: FramePreprocessor,
    adapter: InferenceAdapter,
    mask_builder: MaskBuilder,
    classifier: DepartureClassifier,
    results: Arc<ResultChannel<DepartureResult>>,
    stats: PipelineStats,
}

impl LanePipeline {
    /// Create a pipeline around an already initialized adapter
    pub fn new(config: &LaneConfig, adapter: InferenceAdapter) -> Result<Self, LaneError> {
        config.validate()?;

        let expected = (config.input_width, config.input_height);
        if adapter.input_dims() != expected {
            return Err(LaneError::Config(format!(
                "adapter input {:?} does not match configured input {:?}",
                adapter.input_dims(),
                expected
            )));
        }

        info!(
            "Creating lane pipeline: input={}x{}, threshold={}, scan_row={}",
            config.input_width, config.input_height, config.detection_threshold, config.scan_row
        );

        Ok(Self {
            preprocessor: FramePreprocessor::from_config(config),
            adapter,
            mask_builder: MaskBuilder::from_config(config),
            classifier: DepartureClassifier::from_config(config),
            results: Arc::new(ResultChannel::new()),
            stats: PipelineStats::default(),
        })
    }

    /// Create a pipeline and its adapter from configuration
    pub fn from_config(config: &LaneConfig) -> Result<Self, LaneError> {
        let adapter = config.build_adapter()?;
        Self::new(config, adapter)
    }

    /// Run the full chain on one camera frame
    pub fn process(&mut self, frame: &RawFrame) -> Result<DepartureResult, LaneError> {
        let start = Instant::now();

        let prepared = self.preprocessor.prepare(frame)?;
        let mut result = self.process_prepared(&prepared, frame.width, frame.height)?;
        drop(prepared);

        result.sequence = frame.sequence;
        result.latency = start.elapsed();
        debug!(
            "Frame {} classified as '{}' in {:?}",
            frame.sequence, result.label, result.latency
        );
        Ok(result)
    }

    /// Run inference and post-processing on an image that is already at
    /// model resolution. The mask is scaled for a `frame_width`x`frame_height` camera frame.
    pub fn process_prepared(
        &mut self,
        prepared: &PreparedImage,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<DepartureResult, LaneError> {
        let start = Instant::now();

        let (width, height) = prepared.dimensions();
        let (expected_width, expected_height) = self.adapter.input_dims();
        if (width, height) != (expected_width, expected_height) {
            return Err(LaneError::SizeMismatch {
                width,
                height,
                expected_width,
                expected_height,
            });
        }
        if frame_width == 0 || frame_height == 0 {
            return Err(LaneError::ImagePreparation(format!(
                "cannot scale mask to {}x{}",
                frame_width, frame_height
            )));
        }

        let probs = self.adapter.run(prepared.as_rgb())?;
        let scan = self.mask_builder.build(&probs);
        drop(probs);

        let classification = self.classifier.classify(&scan.boundaries, scan.control);
        if scan.lane_detected() && !scan.boundaries.row_detected() {
            debug!(
                "{} lane pixels found but none on the scan row, boundaries stay at origin",
                scan.control
            );
        }

        let mask = rescale_mask(&scan.mask, frame_width, frame_height);

        Ok(DepartureResult {
            mask: Some(mask),
            label: classification.label,
            classification,
            sequence: 0,
            latency: start.elapsed(),
        })
    }

    /// Process one frame and publish its result. Any failure abandons the
    /// frame: it is logged and counted, and nothing is published.
    pub fn handle_frame(&mut self, frame: RawFrame) -> Option<Arc<DepartureResult>> {
        let outcome = self.process(&frame);
        drop(frame);
        self.finish(outcome)
    }

    /// Like [`LanePipeline::handle_frame`] for an already prepared image
    pub fn handle_prepared(
        &mut self,
        prepared: &PreparedImage,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Arc<DepartureResult>> {
        let outcome = self.process_prepared(prepared, frame_width, frame_height);
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Result<DepartureResult, LaneError>) -> Option<Arc<DepartureResult>> {
        match outcome {
            Ok(result) => {
                self.stats.processed += 1;
                metrics::counter!("lane_frames_processed_total").increment(1);
                metrics::histogram!("lane_frame_latency_seconds").record(result.latency.as_secs_f64());
                Some(self.results.publish(result))
            }
            Err(e) => {
                self.stats.dropped += 1;
                metrics::counter!("lane_frames_dropped_total", "reason" => e.reason()).increment(1);
                match &e {
                    LaneError::Inference(_) => error!("Analyzer error, frame dropped: {}", e),
                    _ => warn!("Frame dropped: {}", e),
                }
                None
            }
        }
    }

    /// Register a display consumer
    pub fn subscribe(&self) -> Subscription<DepartureResult> {
        self.results.subscribe()
    }

    /// Shared handle to the result channel
    pub fn results(&self) -> Arc<ResultChannel<DepartureResult>> {
        self.results.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Release the model. The pipeline rejects frames afterwards.
    pub fn shutdown(&mut self) {
        self.adapter.release();
        info!(
            "Lane pipeline stopped: {} processed, {} dropped",
            self.stats.processed, self.stats.dropped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{LANE_GREEN, TRANSPARENT};
    use camera_capture::{PixelFormat, Rotation};
    use image::RgbImage;
    use inference_engine::{InputNormalization, MockBackend, ModelLifecycle};

    const W: u32 = 80;
    const H: u32 = 160;

    fn map_with(points: &[(u32, u32)]) -> Vec<f32> {
        let mut values = vec![0.0; (W * H) as usize];
        for &(x, y) in points {
            values[(y * W + x) as usize] = 0.95;
        }
        values
    }

    fn pipeline(backend: MockBackend) -> LanePipeline {
        let mut adapter = InferenceAdapter::new(
            Box::new(backend),
            W,
            H,
            ModelLifecycle::Persistent,
            InputNormalization::Raw,
        );
        adapter.initialize().unwrap();
        LanePipeline::new(&LaneConfig::default(), adapter).unwrap()
    }

    fn nv21_frame(width: u32, height: u32) -> RawFrame {
        let len = RawFrame::expected_len(PixelFormat::Nv21, width, height);
        RawFrame::new(vec![128; len], width, height, PixelFormat::Nv21, Rotation::Deg90)
    }

    #[test]
    fn test_zero_map_is_no_lane_detected() {
        let mut pipeline = pipeline(MockBackend::constant(0.0, W, H));
        let result = pipeline.process(&nv21_frame(64, 48)).unwrap();

        assert_eq!(result.label, DepartureLabel::NoLaneDetected);
        assert_eq!(result.label.as_str(), "No Lane Detected");
        let mask = result.mask.expect("mask attached");
        assert!(mask.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn test_single_centre_pixel_is_normal_driving() {
        let mut pipeline = pipeline(MockBackend::from_map(map_with(&[(40, 120)])));
        let result = pipeline.process(&nv21_frame(64, 48)).unwrap();

        assert_eq!(result.classification.kl, result.classification.kr);
        assert_eq!(result.label, DepartureLabel::NormalDriving);
    }

    #[test]
    fn test_asymmetric_boundaries() {
        let mut right = pipeline(MockBackend::from_map(map_with(&[(10, 120), (45, 120)])));
        let result = right.process(&nv21_frame(64, 48)).unwrap();
        assert_eq!(result.label, DepartureLabel::RightDeparture);

        let mut left = pipeline(MockBackend::from_map(map_with(&[(35, 120), (79, 120)])));
        let result = left.process(&nv21_frame(64, 48)).unwrap();
        assert_eq!(result.label, DepartureLabel::LeftDeparture);
    }

    #[test]
    fn test_mask_matches_frame_with_swapped_axes() {
        let mut pipeline = pipeline(MockBackend::from_map(map_with(&[(0, 0)])));
        let result = pipeline.process(&nv21_frame(320, 240)).unwrap();
        let mask = result.mask.unwrap();
        assert_eq!(mask.dimensions(), (240, 320));
        assert_eq!(*mask.get_pixel(0, 0), LANE_GREEN);
    }

    #[test]
    fn test_wrong_prepared_size_is_contained() {
        let mut pipeline = pipeline(MockBackend::constant(0.9, W, H));
        let mut sub = pipeline.subscribe();

        let oversized = PreparedImage::from_rgb(RgbImage::new(W * 2, H));
        let err = pipeline.process_prepared(&oversized, 640, 480).unwrap_err();
        assert!(matches!(err, LaneError::SizeMismatch { width: 160, height: 160, .. }));

        assert!(pipeline.handle_prepared(&oversized, 640, 480).is_none());
        assert_eq!(pipeline.stats().dropped, 1);
        assert!(sub.poll().is_none());

        // the next good frame still goes through
        assert!(pipeline.handle_frame(nv21_frame(64, 48)).is_some());
        assert_eq!(pipeline.stats().processed, 1);
        assert!(sub.poll().is_some());
    }

    #[test]
    fn test_bad_frame_is_dropped_without_publishing() {
        let mut pipeline = pipeline(MockBackend::constant(0.0, W, H));
        let mut sub = pipeline.subscribe();

        let broken = RawFrame::new(vec![0; 3], 64, 48, PixelFormat::Nv21, Rotation::Deg0);
        assert!(pipeline.handle_frame(broken).is_none());
        assert!(sub.poll().is_none());
        assert_eq!(pipeline.stats(), PipelineStats { processed: 0, dropped: 1 });
    }

    #[test]
    fn test_inference_failure_is_dropped() {
        let mut pipeline = pipeline(MockBackend::constant(0.0, W, H).failing());
        assert!(pipeline.handle_frame(nv21_frame(64, 48)).is_none());
        assert!(matches!(
            pipeline.process(&nv21_frame(64, 48)),
            Err(LaneError::Inference(_))
        ));
        assert_eq!(pipeline.stats().dropped, 1);
    }

    #[test]
    fn test_results_published_in_order() {
        let mut pipeline = pipeline(MockBackend::constant(0.0, W, H));
        let channel = pipeline.results();

        for seq in 1..=3 {
            let frame = nv21_frame(64, 48).with_sequence(seq, seq as u64 * 33_000_000);
            let published = pipeline.handle_frame(frame).unwrap();
            assert_eq!(published.sequence, seq);
        }
        assert_eq!(channel.published_count(), 3);
        assert_eq!(channel.latest().unwrap().sequence, 3);
    }

    #[test]
    fn test_adapter_size_must_match_config() {
        let adapter = InferenceAdapter::new(
            Box::new(MockBackend::constant(0.0, 32, 32)),
            32,
            32,
            ModelLifecycle::Persistent,
            InputNormalization::Raw,
        );
        assert!(matches!(
            LanePipeline::new(&LaneConfig::default(), adapter),
            Err(LaneError::Config(_))
        ));
    }

    #[test]
    fn test_shutdown_releases_model() {
        let backend = MockBackend::constant(0.0, W, H);
        let counters = backend.counters();
        let mut pipeline = pipeline(backend);
        pipeline.shutdown();
        assert_eq!(counters.unloads(), 1);
        assert!(pipeline.handle_frame(nv21_frame(64, 48)).is_none());
    }
}
