//! Per-pixel probability map

use crate::InferenceError;

/// Single-channel model output, row-major, indexed as `y * width + x`
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityBuffer {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl ProbabilityBuffer {
    /// Wrap raw model output. Values are clamped to [0, 1]; NaN becomes 0.
    pub fn new(mut values: Vec<f32>, width: u32, height: u32) -> Result<Self, InferenceError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(InferenceError::InvalidOutputShape {
                expected,
                actual: values.len(),
            });
        }

        for v in values.iter_mut() {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }

        Ok(Self {
            values,
            width,
            height,
        })
    }

    /// Buffer filled with a single value
    pub fn filled(value: f32, width: u32, height: u32) -> Result<Self, InferenceError> {
        Self::new(vec![value; width as usize * height as usize], width, height)
    }

    /// Probability at (x, y)
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get((y * self.width + x) as usize).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_must_match() {
        let err = ProbabilityBuffer::new(vec![0.0; 10], 80, 160).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::InvalidOutputShape { expected: 12_800, actual: 10 }
        ));
    }

    #[test]
    fn test_values_are_clamped() {
        let buf = ProbabilityBuffer::new(vec![-1.0, 0.5, 2.0, f32::NAN], 2, 2).unwrap();
        assert_eq!(buf.as_slice(), &[0.0, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_row_major_indexing() {
        let values: Vec<f32> = (0..6).map(|i| i as f32 / 10.0).collect();
        let buf = ProbabilityBuffer::new(values, 3, 2).unwrap();
        assert_eq!(buf.get(0, 1), Some(0.3));
        assert_eq!(buf.get(2, 1), Some(0.5));
        assert_eq!(buf.get(3, 0), None);
    }
}
