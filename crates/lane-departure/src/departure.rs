//! Departure classification

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mask::BoundaryPoints;
use crate::LaneConfig;

/// Vehicle position relative to the detected lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepartureLabel {
    LeftDeparture,
    RightDeparture,
    NormalDriving,
    NoLaneDetected,
}

impl DepartureLabel {
    /// Display text
    pub fn as_str(&self) -> &'static str {
        match self {
            DepartureLabel::LeftDeparture => "Left Departure",
            DepartureLabel::RightDeparture => "Right Departure",
            DepartureLabel::NormalDriving => "Normal Driving",
            DepartureLabel::NoLaneDetected => "No Lane Detected",
        }
    }

    pub fn is_departure(&self) -> bool {
        matches!(
            self,
            DepartureLabel::LeftDeparture | DepartureLabel::RightDeparture
        )
    }
}

impl fmt::Display for DepartureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus the distances it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: DepartureLabel,
    /// Left boundary to anchor
    pub kl: Option<f64>,
    /// Right boundary to anchor
    pub kr: Option<f64>,
}

/// Planar Euclidean distance
pub fn distance(x1: u32, y1: u32, x2: u32, y2: u32) -> f64 {
    let dx = x2 as f64 - x1 as f64;
    let dy = y2 as f64 - y1 as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Compares boundary distances to one shared anchor point
#[derive(Debug, Clone, Copy)]
pub struct DepartureClassifier {
    scan_row: u32,
    anchor: (u32, u32),
}

impl DepartureClassifier {
    pub fn new(scan_row: u32, anchor: (u32, u32)) -> Self {
        Self { scan_row, anchor }
    }

    pub fn from_config(config: &LaneConfig) -> Self {
        Self::new(config.scan_row, (config.anchor_x, config.anchor_y))
    }

    pub fn classify(&self, boundaries: &BoundaryPoints, control: usize) -> Classification {
        if control == 0 {
            return Classification {
                label: DepartureLabel::NoLaneDetected,
                kl: None,
                kr: None,
            };
        }

        let (ax, ay) = self.anchor;
        let kl = distance(boundaries.left, self.scan_row, ax, ay);
        let kr = distance(boundaries.right, self.scan_row, ax, ay);

        Classification {
            label: compare(kr, kl),
            kl: Some(kl),
            kr: Some(kr),
        }
    }
}

/// Right boundary closer to the anchor means drifting right, and vice versa
fn compare(kr: f64, kl: f64) -> DepartureLabel {
    if kr < kl {
        DepartureLabel::RightDeparture
    } else if kr > kl {
        DepartureLabel::LeftDeparture
    } else {
        DepartureLabel::NormalDriving
    }
}
