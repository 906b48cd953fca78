//! Distribution summaries over successful trials.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    #[error("cannot summarize an empty sample")]
    EmptyData,

    #[error("sample contains a non-finite value at position {0}")]
    NonFinite(usize),
}

/// Percentiles reported for every metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; zero for a single observation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Result<Self, StatsError> {
        if values.is_empty() {
            return Err(StatsError::EmptyData);
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(StatsError::NonFinite(pos));
        }

        let std_dev = if values.len() < 2 {
            0.0
        } else {
            Statistics::std_dev(values)
        };

        let mut data = Data::new(values.to_vec());
        let percentiles = Percentiles {
            p5: data.percentile(5),
            p10: data.percentile(10),
            p25: data.percentile(25),
            p50: data.percentile(50),
            p75: data.percentile(75),
            p90: data.percentile(90),
            p95: data.percentile(95),
        };

        Ok(Self {
            count: values.len(),
            mean: Statistics::mean(values),
            std_dev,
            min: Statistics::min(values),
            max: Statistics::max(values),
            percentiles,
        })
    }

    /// Coefficient of variation, `None` when the mean is zero.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        (self.mean.abs() > f64::EPSILON).then(|| self.std_dev / self.mean.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_basic_moments() {
        let s = Summary::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(s.count, 5);
        assert!((s.mean - 3.0).abs() < 1e-12);
        assert!((s.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 5.0);
        assert!((s.percentiles.p50 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentiles_are_monotone_and_bounded() {
        let values: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
        let s = Summary::from_values(&values).unwrap();
        let p = s.percentiles;
        let ordered = [s.min, p.p5, p.p10, p.p25, p.p50, p.p75, p.p90, p.p95, s.max];
        for w in ordered.windows(2) {
            assert!(w[0] <= w[1], "{:?}", ordered);
        }
    }

    #[test]
    fn test_single_value_has_zero_spread() {
        let s = Summary::from_values(&[42.0]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.percentiles.p5, 42.0);
        assert_eq!(s.percentiles.p95, 42.0);
        assert_eq!(s.coefficient_of_variation(), Some(0.0));
    }

    #[test]
    fn test_rejects_empty_and_nan() {
        assert_eq!(Summary::from_values(&[]), Err(StatsError::EmptyData));
        assert_eq!(
            Summary::from_values(&[1.0, f64::NAN]),
            Err(StatsError::NonFinite(1))
        );
    }
}
