use std::collections::{BTreeMap, VecDeque};

use rayon::prelude::*;

/// Label assigned to points that belong to no cluster.
pub const NOISE: i64 = -1;

/// Result of DBSCAN clustering.
#[derive(Debug, Clone)]
pub struct DbscanResult {
    /// Cluster label per input point, in input order. Noise is [`NOISE`].
    pub labels: Vec<i64>,
    /// Total number of clusters found.
    pub num_clusters: usize,
}

impl DbscanResult {
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Cluster size per label, keyed by the label as a string (`"-1"` = noise).
    pub fn histogram(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &l in &self.labels {
            *counts.entry(l).or_default() += 1;
        }
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// Run DBSCAN density-based clustering on dense feature vectors.
///
/// # Arguments
/// * `points`: one feature vector per point
/// * `eps`: neighborhood radius (Euclidean distance)
/// * `min_pts`: minimum number of neighbors (including the point itself) to form a core point
pub fn dbscan(points: &[Vec<f64>], eps: f64, min_pts: usize) -> DbscanResult {
    let n = points.len();
    if n == 0 {
        return DbscanResult {
            labels: Vec::new(),
            num_clusters: 0,
        };
    }

    let eps_sq = eps * eps;

    // Pre-compute pairwise neighbor lists to avoid redundant distance calculations.
    let neighbors: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .filter(|&j| squared_euclidean(&points[i], &points[j]) <= eps_sq)
                .collect()
        })
        .collect();

    let mut labels: Vec<Option<i64>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut current_cluster: i64 = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        if neighbors[i].len() < min_pts {
            // Not a core point; tentatively noise (may be claimed by a cluster later).
            continue;
        }

        labels[i] = Some(current_cluster);

        let mut queue: VecDeque<usize> = neighbors[i]
            .iter()
            .copied()
            .filter(|&j| j != i)
            .collect();

        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(current_cluster);
            }

            if visited[j] {
                continue;
            }
            visited[j] = true;

            if neighbors[j].len() >= min_pts {
                for &nb in &neighbors[j] {
                    if labels[nb].is_none() {
                        queue.push_back(nb);
                    }
                }
            }
        }

        current_cluster += 1;
    }

    DbscanResult {
        labels: labels.into_iter().map(|l| l.unwrap_or(NOISE)).collect(),
        num_clusters: current_cluster as usize,
    }
}

/// Squared Euclidean distance between two vectors.
#[inline]
fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let result = dbscan(&[], 1.0, 2);
        assert_eq!(result.num_clusters, 0);
        assert!(result.labels.is_empty());
        assert!(result.histogram().is_empty());
    }

    #[test]
    fn single_point_is_noise() {
        let result = dbscan(&[vec![0.0, 0.0]], 1.0, 2);
        assert_eq!(result.num_clusters, 0);
        assert_eq!(result.labels, vec![NOISE]);
    }

    #[test]
    fn two_clusters_well_separated() {
        let points = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![100.0, 100.0],
            vec![101.0, 100.0],
            vec![100.0, 101.0],
        ];

        let result = dbscan(&points, 2.0, 2);

        assert_eq!(result.num_clusters, 2);
        assert_eq!(result.noise_count(), 0);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_eq!(result.labels[3], result.labels[5]);
        assert_ne!(result.labels[0], result.labels[3]);
    }

    #[test]
    fn noise_points_detected_and_histogrammed() {
        let points = vec![
            vec![0.0, 0.0],
            vec![0.5, 0.0],
            vec![0.0, 0.5],
            vec![50.0, 50.0], // outlier
            vec![10.0, 10.0],
            vec![10.5, 10.0],
            vec![10.0, 10.5],
        ];

        let result = dbscan(&points, 1.0, 2);

        assert_eq!(result.num_clusters, 2);
        assert_eq!(result.labels[3], NOISE);

        let hist = result.histogram();
        assert_eq!(hist["-1"], 1);
        assert_eq!(hist["0"], 3);
        assert_eq!(hist["1"], 3);
    }

    #[test]
    fn chain_connectivity() {
        let points: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let result = dbscan(&points, 1.5, 2);
        assert_eq!(result.num_clusters, 1);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn high_min_pts_makes_everything_noise() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let result = dbscan(&points, 1.0, 10);
        assert_eq!(result.num_clusters, 0);
        assert_eq!(result.noise_count(), 3);
    }

    #[test]
    fn border_point_assigned_to_cluster() {
        // (2.0) is within eps of (1.0) but has too few neighbors to be core.
        let points = vec![vec![0.0], vec![0.5], vec![1.0], vec![2.0]];
        let result = dbscan(&points, 1.2, 2);
        assert_ne!(result.labels[3], NOISE, "border point should be assigned to a cluster");
    }
}
