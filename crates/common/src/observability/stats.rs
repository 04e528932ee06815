//! Latency summary statistics
//!
//! Percentiles use the nearest-rank-from-below rule over the ascending sort:
//! `median = v[n/2]`, `p95 = v[floor(n * 0.95)]`, `p99 = v[floor(n * 0.99)]`.
//! The result is a pure function of the input values.

use serde::Serialize;

/// Summary of a set of durations, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationStats {
    /// Number of samples
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Middle value
    pub median: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl DurationStats {
    /// Summarize `values`; `None` when empty
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let at = |q: f64| sorted[((n as f64 * q).floor() as usize).min(n - 1)];

        Some(Self {
            count: n,
            mean: sorted.iter().sum::<f64>() / n as f64,
            median: sorted[n / 2],
            p95: at(0.95),
            p99: at(0.99),
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_stats() {
        assert!(DurationStats::compute(&[]).is_none());
    }

    /// Validates percentile indices over 1..=100.
    ///
    /// Assertions:
    /// - Confirms median = v[50], p95 = v[95], p99 = v[99].
    /// - Confirms mean, min, and max.
    #[test]
    fn percentiles_over_hundred_samples() {
        let values: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let stats = DurationStats::compute(&values).expect("stats");

        assert_eq!(stats.count, 100);
        assert!((stats.median - 51.0).abs() < f64::EPSILON);
        assert!((stats.p95 - 96.0).abs() < f64::EPSILON);
        assert!((stats.p99 - 100.0).abs() < f64::EPSILON);
        assert!((stats.mean - 50.5).abs() < f64::EPSILON);
        assert!((stats.min - 1.0).abs() < f64::EPSILON);
        assert!((stats.max - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_sample() {
        let stats = DurationStats::compute(&[42.0]).expect("stats");
        assert!((stats.p99 - 42.0).abs() < f64::EPSILON);
        assert!((stats.median - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let values = [120.0, 5.5, 3000.0, 87.0, 87.0, 2.0, 640.0];
        assert_eq!(DurationStats::compute(&values), DurationStats::compute(&values));
    }
}
