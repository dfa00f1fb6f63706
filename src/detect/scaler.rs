//! Fitted standard scaler
//!
//! Applies the training-time standardization `(x - mean) / scale` column-wise
//! across a whole batch. Parameters come from the artifact bundle; this module
//! never fits anything.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::DetectError;

/// Per-column standardization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl ScalerParams {
    /// Identity scaler over `n` columns (useful in tests and as a degraded default)
    pub fn identity(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            scale: vec![1.0; n],
        }
    }

    /// Number of columns the scaler was fitted on
    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    /// Standardize the matrix in place
    ///
    /// Pure and batch-vectorized; the only failure is a column-count mismatch.
    pub fn transform(&self, matrix: &mut Array2<f32>) -> Result<(), DetectError> {
        if matrix.ncols() != self.mean.len() || self.mean.len() != self.scale.len() {
            return Err(DetectError::ShapeMismatch {
                expected: self.mean.len(),
                got: matrix.ncols(),
            });
        }

        for (j, mut col) in matrix.columns_mut().into_iter().enumerate() {
            let mean = self.mean[j];
            // Zero-variance columns from training get a unit scale
            let scale = if self.scale[j].abs() < f32::EPSILON { 1.0 } else { self.scale[j] };
            col.mapv_inplace(|x| (x - mean) / scale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_transform() {
        let scaler = ScalerParams {
            mean: vec![1.0, 10.0],
            scale: vec![2.0, 5.0],
        };
        let mut m = array![[3.0, 20.0], [1.0, 10.0]];
        scaler.transform(&mut m).unwrap();
        assert_eq!(m, array![[1.0, 2.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_zero_scale_column() {
        let scaler = ScalerParams {
            mean: vec![5.0],
            scale: vec![0.0],
        };
        let mut m = array![[7.0]];
        scaler.transform(&mut m).unwrap();
        assert_eq!(m[[0, 0]], 2.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let scaler = ScalerParams::identity(3);
        let mut m = Array2::<f32>::zeros((2, 2));
        assert!(matches!(
            scaler.transform(&mut m),
            Err(DetectError::ShapeMismatch { expected: 3, got: 2 })
        ));
    }
}
