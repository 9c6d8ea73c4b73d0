use serde::{Deserialize, Serialize};

use super::scaler::check_matrix;
use crate::error::ComputeError;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-12;

/// Linear projection onto the top principal components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    /// Column means subtracted before projecting.
    pub mean: Vec<f64>,
    /// `k` unit-length components, each `dim` wide, ordered by variance.
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl Pca {
    /// Fit `n_components` components from row-major data.
    ///
    /// Eigenvectors come from a cyclic Jacobi decomposition of the covariance
    /// matrix. Each component is sign-flipped so its largest-magnitude entry
    /// is positive, which makes the projection reproducible across fits.
    pub fn fit(data: &[Vec<f64>], n_components: usize) -> Result<Self, ComputeError> {
        let dim = check_matrix(data)?;
        if n_components == 0 || n_components > dim {
            return Err(ComputeError::InvalidParameter(format!(
                "n_components must be in 1..={dim}, got {n_components}"
            )));
        }

        let n = data.len();
        let mean: Vec<f64> = (0..dim)
            .map(|j| data.iter().map(|r| r[j]).sum::<f64>() / n as f64)
            .collect();

        let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
        let mut cov = vec![vec![0.0; dim]; dim];
        for row in data {
            for i in 0..dim {
                let di = row[i] - mean[i];
                for j in i..dim {
                    cov[i][j] += di * (row[j] - mean[j]);
                }
            }
        }
        for i in 0..dim {
            for j in i..dim {
                cov[i][j] /= denom;
                cov[j][i] = cov[i][j];
            }
        }

        let (eigenvalues, eigenvectors) = jacobi_eigen(cov);

        let mut order: Vec<usize> = (0..dim).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

        let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let mut components = Vec::with_capacity(n_components);
        let mut explained_variance = Vec::with_capacity(n_components);
        let mut explained_variance_ratio = Vec::with_capacity(n_components);

        for &idx in order.iter().take(n_components) {
            let mut component: Vec<f64> = (0..dim).map(|r| eigenvectors[r][idx]).collect();
            let pivot = component
                .iter()
                .copied()
                .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            if pivot < 0.0 {
                component.iter_mut().for_each(|v| *v = -*v);
            }
            let variance = eigenvalues[idx].max(0.0);
            components.push(component);
            explained_variance.push(variance);
            explained_variance_ratio.push(if total > 0.0 { variance / total } else { 0.0 });
        }

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| {
                c.iter()
                    .zip(row.iter().zip(&self.mean))
                    .map(|(w, (x, m))| w * (x - m))
                    .sum()
            })
            .collect()
    }

    pub fn transform(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Eigen-decompose a symmetric matrix. Returns eigenvalues and a matrix whose
/// columns are the matching eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[i][j] * a[i][j])
            .sum();
        if off < JACOBI_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}
