//! Shared feature pipeline: imputation, scaling and PCA projection.
//!
//! The pipeline is fitted once, persisted through the artifact store and
//! loaded by the scoring loop and the clustering job so both see the same
//! projection of a reading.

use serde::{Deserialize, Serialize};

use powerwatch_core::config::{Imputation, ScalerKind};
use powerwatch_core::{FeatureRow, Reading, FEATURE_COLUMNS, FEATURE_COUNT};

use crate::algorithms::pca::Pca;
use crate::algorithms::scaler::FittedScaler;
use crate::error::ComputeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    pub columns: Vec<String>,
    pub imputation: Imputation,
    /// Value substituted for a missing cell, per column.
    pub fill_values: Vec<f64>,
    pub scaler: FittedScaler,
    pub pca: Pca,
    pub trained_rows: usize,
}

impl FeaturePipeline {
    pub fn fit(
        rows: &[FeatureRow],
        scaler_kind: ScalerKind,
        imputation: Imputation,
        n_components: usize,
    ) -> Result<Self, ComputeError> {
        if rows.len() < 2 {
            return Err(ComputeError::InsufficientData(format!(
                "feature pipeline needs at least 2 rows, got {}",
                rows.len()
            )));
        }

        let fill_values: Vec<f64> = match imputation {
            Imputation::Zero => vec![0.0; FEATURE_COUNT],
            Imputation::Mean => (0..FEATURE_COUNT)
                .map(|j| {
                    let present: Vec<f64> = rows.iter().filter_map(|r| finite(r[j])).collect();
                    if present.is_empty() {
                        0.0
                    } else {
                        present.iter().sum::<f64>() / present.len() as f64
                    }
                })
                .collect(),
        };

        let filled: Vec<Vec<f64>> = rows.iter().map(|r| fill(r, &fill_values)).collect();
        let scaler = FittedScaler::fit(scaler_kind, &filled)?;
        let scaled = scaler.transform(&filled);
        let pca = Pca::fit(&scaled, n_components)?;

        Ok(Self {
            columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            imputation,
            fill_values,
            scaler,
            pca,
            trained_rows: rows.len(),
        })
    }

    pub fn output_dim(&self) -> usize {
        self.pca.n_components()
    }

    /// Missing cells replaced by the fitted fill values.
    pub fn impute(&self, row: &FeatureRow) -> Vec<f64> {
        fill(row, &self.fill_values)
    }

    pub fn transform_row(&self, row: &FeatureRow) -> Vec<f64> {
        let scaled = self.scaler.transform_row(&self.impute(row));
        self.pca.transform_row(&scaled)
    }

    pub fn transform(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn transform_readings(&self, readings: &[Reading]) -> Vec<Vec<f64>> {
        readings.iter().map(|r| self.transform_row(&r.features())).collect()
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn fill(row: &FeatureRow, fill_values: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(fill_values)
        .map(|(v, f)| finite(*v).unwrap_or(*f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<FeatureRow> {
        (0..40)
            .map(|i| {
                let p = 1.0 + (i % 10) as f64 * 0.4;
                [
                    Some(p),
                    Some(0.1 + (i % 3) as f64 * 0.05),
                    Some(230.0 + (i % 7) as f64),
                    Some(p * 4.3),
                    Some(0.0),
                    if i % 5 == 0 { None } else { Some((i % 4) as f64) },
                    Some(17.0),
                ]
            })
            .collect()
    }

    #[test]
    fn transform_is_idempotent_and_fixed_width() {
        let p = FeaturePipeline::fit(&rows(), ScalerKind::Standard, Imputation::Mean, 2).unwrap();
        let row = rows()[3];
        let a = p.transform_row(&row);
        let b = p.transform_row(&row);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(p.output_dim(), 2);
    }

    #[test]
    fn mean_imputation_uses_training_means() {
        let p = FeaturePipeline::fit(&rows(), ScalerKind::Standard, Imputation::Mean, 2).unwrap();
        let present: Vec<f64> = rows().iter().filter_map(|r| r[5]).collect();
        let expected = present.iter().sum::<f64>() / present.len() as f64;
        assert!((p.fill_values[5] - expected).abs() < 1e-12);

        let mut row = rows()[1];
        row[5] = None;
        assert!((p.impute(&row)[5] - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_imputation_and_nan_cells() {
        let p = FeaturePipeline::fit(&rows(), ScalerKind::Robust, Imputation::Zero, 3).unwrap();
        let mut row = rows()[2];
        row[0] = Some(f64::NAN);
        row[1] = None;
        let imputed = p.impute(&row);
        assert_eq!(imputed[0], 0.0);
        assert_eq!(imputed[1], 0.0);
        assert!(p.transform_row(&row).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn refitting_same_rows_gives_same_pipeline() {
        let a = FeaturePipeline::fit(&rows(), ScalerKind::Standard, Imputation::Mean, 2).unwrap();
        let b = FeaturePipeline::fit(&rows(), ScalerKind::Standard, Imputation::Mean, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_rows() {
        let one = vec![rows()[0]];
        assert!(FeaturePipeline::fit(&one, ScalerKind::Standard, Imputation::Mean, 2).is_err());
    }
}
