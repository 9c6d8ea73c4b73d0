use serde::{Deserialize, Serialize};

use super::stats;

/// Fraction floor applied to every bucket so empty buckets do not produce `ln(0)`.
const PSI_EPSILON: f64 = 1e-6;

/// Population Stability Index of `actual` against `expected`.
///
/// Bucket edges are the `expected` percentiles at `0, 100/buckets, ..., 100`,
/// with the outer edges opened to +/- infinity so every value of `actual` falls
/// in some bucket. Returns NaN when either side is empty. Not symmetric.
pub fn psi(expected: &[f64], actual: &[f64], buckets: usize) -> f64 {
    if expected.is_empty() || actual.is_empty() || buckets == 0 {
        return f64::NAN;
    }

    let mut sorted = expected.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let interior: Vec<f64> = (1..buckets)
        .map(|i| stats::percentile_sorted(&sorted, i as f64 * 100.0 / buckets as f64))
        .collect();

    let e = bucket_fractions(expected, &interior, buckets);
    let a = bucket_fractions(actual, &interior, buckets);

    e.iter()
        .zip(&a)
        .map(|(&e, &a)| {
            let (e, a) = (e.max(PSI_EPSILON), a.max(PSI_EPSILON));
            (a - e) * (a / e).ln()
        })
        .sum()
}

fn bucket_fractions(values: &[f64], interior_edges: &[f64], buckets: usize) -> Vec<f64> {
    let mut counts = vec![0usize; buckets];
    for &v in values {
        counts[interior_edges.partition_point(|&edge| edge <= v)] += 1;
    }
    counts
        .into_iter()
        .map(|c| c as f64 / values.len() as f64)
        .collect()
}

/// Two-sample Kolmogorov-Smirnov test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample KS statistic with its asymptotic p-value. NaN on empty input.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> KsResult {
    if a.is_empty() || b.is_empty() {
        return KsResult {
            statistic: f64::NAN,
            p_value: f64::NAN,
        };
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));
    let (n, m) = (a.len(), b.len());

    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n as f64 - j as f64 / m as f64).abs());
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let p_value = kolmogorov_q((en + 0.12 + 0.11 / en) * d).clamp(0.0, 1.0);
    KsResult { statistic: d, p_value }
}

/// Kolmogorov survival function `Q(lambda) = 2 * sum (-1)^(k-1) exp(-2 k^2 lambda^2)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = fac * (a2 * k * k).exp();
        sum += term;
        if term.abs() <= 0.001 * previous || term.abs() <= 1e-8 * sum {
            return sum;
        }
        fac = -fac;
        previous = term.abs();
    }
    // Series did not converge: lambda is tiny, distributions are indistinguishable.
    1.0
}
