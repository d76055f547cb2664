//! Lane mask construction and boundary sampling

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use inference_engine::ProbabilityBuffer;
use serde::{Deserialize, Serialize};

use crate::LaneConfig;

/// Mask color for lane pixels
pub const LANE_GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Mask color for everything else
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Lane boundary candidates on the scan row.
///
/// `left` is the first qualifying x, `right` the last. Both stay 0 when the
/// scan row has no qualifying pixel, even if other rows do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryPoints {
    pub left: u32,
    pub right: u32,
    /// Qualifying pixels seen on the scan row
    pub row_hits: usize,
}

impl BoundaryPoints {
    pub fn row_detected(&self) -> bool {
        self.row_hits > 0
    }
}

/// Result of one pass over a probability map
#[derive(Debug, Clone)]
pub struct LaneScan {
    /// Model-resolution mask
    pub mask: RgbaImage,
    pub boundaries: BoundaryPoints,
    /// Qualifying pixels in the whole map
    pub control: usize,
}

impl LaneScan {
    pub fn lane_detected(&self) -> bool {
        self.control > 0
    }
}

/// Thresholds probabilities into a mask and samples the scan row
#[derive(Debug, Clone, Copy)]
pub struct MaskBuilder {
    threshold: f32,
    scan_row: u32,
}

impl MaskBuilder {
    pub fn new(threshold: f32, scan_row: u32) -> Self {
        Self {
            threshold,
            scan_row,
        }
    }

    pub fn from_config(config: &LaneConfig) -> Self {
        Self::new(config.detection_threshold, config.scan_row)
    }

    /// Single pass in index order over the map
    pub fn build(&self, probs: &ProbabilityBuffer) -> LaneScan {
        let width = probs.width();
        // starts fully transparent
        let mut mask = RgbaImage::new(width, probs.height());
        let mut boundaries = BoundaryPoints::default();
        let mut control = 0;

        for (index, &p) in probs.as_slice().iter().enumerate() {
            if p < self.threshold {
                continue;
            }
            let index = index as u32;
            let (x, y) = (index % width, index / width);

            control += 1;
            mask.put_pixel(x, y, LANE_GREEN);

            if y == self.scan_row {
                if boundaries.row_hits == 0 {
                    boundaries.left = x;
                }
                boundaries.right = x;
                boundaries.row_hits += 1;
            }
        }

        LaneScan {
            mask,
            boundaries,
            control,
        }
    }
}

/// Scale a model-resolution mask to the camera frame. The output is
/// `frame_height` wide and `frame_width` tall, matching the upright display
/// of a sensor that reports landscape dimensions.
pub fn rescale_mask(mask: &RgbaImage, frame_width: u32, frame_height: u32) -> RgbaImage {
    // nearest keeps every pixel either lane green or transparent
    imageops::resize(mask, frame_height, frame_width, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const W: u32 = 80;
    const H: u32 = 160;

    fn map_with(points: &[(u32, u32)], value: f32) -> ProbabilityBuffer {
        let mut values = vec![0.0; (W * H) as usize];
        for &(x, y) in points {
            values[(y * W + x) as usize] = value;
        }
        ProbabilityBuffer::new(values, W, H).unwrap()
    }

    #[test]
    fn test_all_zero_map_is_empty() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[], 0.0));
        assert_eq!(scan.control, 0);
        assert!(!scan.lane_detected());
        assert_eq!(scan.boundaries, BoundaryPoints::default());
        assert!(scan.mask.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let builder = MaskBuilder::new(0.7, 120);
        assert_eq!(builder.build(&map_with(&[(5, 5)], 0.7)).control, 1);
        assert_eq!(builder.build(&map_with(&[(5, 5)], 0.699)).control, 0);
    }

    #[test]
    fn test_first_left_last_right() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[(10, 120), (33, 120), (70, 120)], 0.9));
        assert_eq!(scan.boundaries.left, 10);
        assert_eq!(scan.boundaries.right, 70);
        assert_eq!(scan.boundaries.row_hits, 3);
        assert_eq!(scan.control, 3);
    }

    #[test]
    fn test_single_hit_sets_both_sides() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[(40, 120)], 1.0));
        assert_eq!(scan.boundaries.left, 40);
        assert_eq!(scan.boundaries.right, 40);
    }

    #[test]
    fn test_hits_off_scan_row_keep_initial_boundaries() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[(12, 30), (60, 150)], 0.8));
        assert_eq!(scan.control, 2);
        assert!(!scan.boundaries.row_detected());
        assert_eq!((scan.boundaries.left, scan.boundaries.right), (0, 0));
    }

    #[test]
    fn test_mask_pixels() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[(3, 7)], 0.95));
        assert_eq!(scan.mask.dimensions(), (W, H));
        assert_eq!(*scan.mask.get_pixel(3, 7), LANE_GREEN);
        assert_eq!(*scan.mask.get_pixel(4, 7), TRANSPARENT);
    }

    #[test]
    fn test_rescale_swaps_axes_and_stays_binary() {
        let scan = MaskBuilder::new(0.7, 120).build(&map_with(&[(0, 0), (40, 80), (79, 159)], 1.0));
        let scaled = rescale_mask(&scan.mask, 640, 480);
        assert_eq!(scaled.dimensions(), (480, 640));
        assert!(scaled.pixels().all(|p| *p == LANE_GREEN || *p == TRANSPARENT));
        assert_eq!(*scaled.get_pixel(0, 0), LANE_GREEN);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_left_never_right_of_right(xs in proptest::collection::vec(0u32..W, 1..20)) {
            let points: Vec<(u32, u32)> = xs.iter().map(|&x| (x, 120)).collect();
            let scan = MaskBuilder::new(0.7, 120).build(&map_with(&points, 0.8));
            prop_assert!(scan.boundaries.left <= scan.boundaries.right);
            prop_assert_eq!(scan.boundaries.left, *xs.iter().min().unwrap());
            prop_assert_eq!(scan.boundaries.right, *xs.iter().max().unwrap());
        }

        #[test]
        fn prop_control_counts_qualifying_pixels(values in proptest::collection::vec(0.0f32..=1.0, (W * H) as usize)) {
            let expected = values.iter().filter(|&&v| v >= 0.7).count();
            let probs = ProbabilityBuffer::new(values, W, H).unwrap();
            let scan = MaskBuilder::new(0.7, 120).build(&probs);
            prop_assert_eq!(scan.control, expected);
            prop_assert_eq!(scan.mask.pixels().filter(|p| **p == LANE_GREEN).count(), expected);
        }
    }
}
