//! Sample distribution statistics
//!
//! Percentiles use linear interpolation between the closest ranks.

use serde::{Deserialize, Serialize};

/// Distribution percentiles (p50, p90, p95, p99, p999)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
}

impl Percentiles {
    /// Calculate percentiles from ascending samples
    pub fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            p50: percentile(sorted, 50.0),
            p90: percentile(sorted, 90.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
            p999: percentile(sorted, 99.9),
        }
    }
}

/// Value at percentile `p` (0-100) of ascending samples
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only,
        _ => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (rank.ceil() as usize).min(sorted.len() - 1);
            let fraction = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Summary of one numeric sample set
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub percentiles: Percentiles,
}

impl SampleStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            std_dev: variance.sqrt(),
            percentiles: Percentiles::from_sorted(&sorted),
        }
    }

    /// Coefficient of variation; zero when the mean is zero
    pub fn cv(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.std_dev / self.mean
        }
    }

    /// One-line summary with `unit` appended to every value
    pub fn format_summary(&self, unit: &str) -> String {
        format!(
            "min={:.0}{u} p50={:.0}{u} p95={:.0}{u} p99={:.0}{u} max={:.0}{u} mean={:.1}{u} std={:.1}{u}",
            self.min,
            self.percentiles.p50,
            self.percentiles.p95,
            self.percentiles.p99,
            self.max,
            self.mean,
            self.std_dev,
            u = unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_interpolate() {
        let data: Vec<f64> = (1..=100).map(f64::from).collect();
        let p = Percentiles::from_sorted(&data);

        assert!((p.p50 - 50.5).abs() < 1e-9);
        assert!((p.p90 - 90.1).abs() < 1e-9);
        assert!((p.p99 - 99.01).abs() < 1e-9);
        assert!(p.p999 <= 100.0);
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
        assert_eq!(percentile(&[1.0, 3.0], 50.0), 2.0);
        assert_eq!(percentile(&[1.0, 3.0], 0.0), 1.0);
        assert_eq!(percentile(&[1.0, 3.0], 100.0), 3.0);
    }

    #[test]
    fn test_sample_stats() {
        let stats = SampleStats::from_samples(&[5.0, 1.0, 4.0, 2.0, 3.0]);

        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.mean, 3.0);
        assert!((stats.std_dev - 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(stats.percentiles.p50, 3.0);
    }

    #[test]
    fn test_sample_stats_empty() {
        let stats = SampleStats::from_samples(&[]);
        assert_eq!(stats, SampleStats::default());
        assert_eq!(stats.cv(), 0.0);
    }
}
