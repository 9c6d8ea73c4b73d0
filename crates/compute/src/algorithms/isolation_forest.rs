use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::scaler::check_matrix;
use crate::error::ComputeError;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Hyperparameters for [`IsolationForest::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Upper bound on the sub-sample drawn per tree; capped at the row count.
    pub max_samples: usize,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_samples: 256,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree stored as a flat node list; index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    pub nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, sample, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        data: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: indices.len() });
        if depth >= height_limit || indices.len() <= 1 {
            return id;
        }

        let dim = data[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..dim)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][f]), hi.max(data[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] <= threshold);

        let left = self.build(data, left, depth + 1, height_limit, rng);
        let right = self.build(data, right, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `x` lands plus the expected remaining depth of its leaf.
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                    depth += 1;
                }
            }
        }
    }
}

/// Ensemble of isolation trees.
///
/// Scores follow the `score_samples` convention: the negated anomaly score
/// `-2^(-E[h(x)] / c(psi))`, in (-1, 0). Lower means more anomalous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub params: ForestParams,
    /// Sub-sample size actually used per tree.
    pub sample_size: usize,
    pub n_features: usize,
    pub trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn fit(data: &[Vec<f64>], params: ForestParams) -> Result<Self, ComputeError> {
        let n_features = check_matrix(data)?;
        let n = data.len();
        if n < 2 {
            return Err(ComputeError::InsufficientData(format!(
                "isolation forest needs at least 2 rows, got {n}"
            )));
        }
        if params.n_estimators == 0 || params.max_samples < 2 {
            return Err(ComputeError::InvalidParameter(
                "n_estimators must be >= 1 and max_samples >= 2".into(),
            ));
        }

        let sample_size = params.max_samples.min(n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        // One seed per tree drawn up front keeps the ensemble deterministic
        // regardless of how rayon schedules the builds.
        let mut seeder = StdRng::seed_from_u64(params.random_state);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| seeder.gen()).collect();

        let trees = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, sample, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            params,
            sample_size,
            n_features,
            trees,
        })
    }

    pub fn score_one(&self, x: &[f64]) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        -(2f64.powf(-mean_depth / average_path_length(self.sample_size)))
    }

    pub fn score_samples(&self, data: &[Vec<f64>]) -> Result<Vec<f64>, ComputeError> {
        if let Some(bad) = data.iter().find(|r| r.len() != self.n_features) {
            return Err(ComputeError::DimensionMismatch {
                expected: self.n_features,
                actual: bad.len(),
            });
        }
        Ok(data.par_iter().map(|x| self.score_one(x)).collect())
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
