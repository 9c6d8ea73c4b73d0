use serde::{Deserialize, Serialize};

use powerwatch_core::config::ScalerKind;

use super::stats;
use crate::error::ComputeError;

/// Per-column centering and scaling learned from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub kind: ScalerKind,
    pub center: Vec<f64>,
    /// Never zero: columns without spread get a scale of 1.
    pub scale: Vec<f64>,
}

impl FittedScaler {
    /// Fit on row-major data. Every row must have the same width.
    pub fn fit(kind: ScalerKind, data: &[Vec<f64>]) -> Result<Self, ComputeError> {
        let dim = check_matrix(data)?;
        let mut center = Vec::with_capacity(dim);
        let mut scale = Vec::with_capacity(dim);

        for j in 0..dim {
            let column: Vec<f64> = data.iter().map(|row| row[j]).collect();
            let (c, s) = match kind {
                ScalerKind::Standard => (stats::mean(&column), stats::std_pop(&column)),
                ScalerKind::Robust => {
                    let mut sorted = column;
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    let q1 = stats::percentile_sorted(&sorted, 25.0);
                    let q3 = stats::percentile_sorted(&sorted, 75.0);
                    (stats::percentile_sorted(&sorted, 50.0), q3 - q1)
                }
            };
            center.push(c);
            scale.push(if s.abs() < f64::EPSILON || !s.is_finite() { 1.0 } else { s });
        }

        Ok(Self { kind, center, scale })
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.center.iter().zip(&self.scale))
            .map(|(v, (c, s))| (v - c) / s)
            .collect()
    }

    pub fn transform(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Validate a non-empty rectangular matrix and return its width.
pub(crate) fn check_matrix(data: &[Vec<f64>]) -> Result<usize, ComputeError> {
    let first = data
        .first()
        .ok_or_else(|| ComputeError::InsufficientData("no rows to fit on".into()))?;
    let dim = first.len();
    if dim == 0 {
        return Err(ComputeError::InsufficientData("rows have no columns".into()));
    }
    if let Some(bad) = data.iter().find(|r| r.len() != dim) {
        return Err(ComputeError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 10.0, 5.0],
            vec![2.0, 20.0, 5.0],
            vec![3.0, 30.0, 5.0],
            vec![4.0, 40.0, 5.0],
        ]
    }

    #[test]
    fn standard_scaler_centers_and_scales() {
        let s = FittedScaler::fit(ScalerKind::Standard, &data()).unwrap();
        assert!((s.center[0] - 2.5).abs() < 1e-12);
        assert!((s.scale[0] - 1.25f64.sqrt()).abs() < 1e-12);

        let out = s.transform(&data());
        let col0: Vec<f64> = out.iter().map(|r| r[0]).collect();
        assert!(stats::mean(&col0).abs() < 1e-12);
        assert!((stats::std_pop(&col0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_gets_unit_scale() {
        let s = FittedScaler::fit(ScalerKind::Standard, &data()).unwrap();
        assert_eq!(s.scale[2], 1.0);
        assert_eq!(s.transform_row(&[0.0, 0.0, 5.0])[2], 0.0);
    }

    #[test]
    fn robust_scaler_uses_median_and_iqr() {
        let s = FittedScaler::fit(ScalerKind::Robust, &data()).unwrap();
        assert!((s.center[1] - 25.0).abs() < 1e-12);
        // q1 = 17.5, q3 = 32.5
        assert!((s.scale[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = FittedScaler::fit(ScalerKind::Standard, &[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ComputeError::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(FittedScaler::fit(ScalerKind::Standard, &[]).is_err());
    }
}
