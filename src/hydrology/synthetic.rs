//! # Synthetic Hydrology
//!
//! Seeded generator of plausible monthly flow records. Each year draws one
//! lognormal "wetness" factor shared by all months, then every month gets
//! its own lognormal noise around the seasonal mean. Useful for tests and
//! for running the model when no historical record file is configured.

use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use super::{HistoricalRecord, HydrologyError, RawYear};

/// Seasonal mean river inflow, April..March (m³/s).
const DEFAULT_MEAN_INFLOW_M3S: [f64; 12] = [
    45.0, 90.0, 140.0, 150.0, 140.0, 135.0, 130.0, 100.0, 70.0, 45.0, 35.0, 35.0,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub n_years: usize,
    /// Calendar year in which the first hydrological year starts.
    pub first_year: i32,
    pub mean_inflow_m3s: [f64; 12],
    /// Coefficient of variation of the year-to-year wetness factor.
    pub inter_annual_cv: f64,
    /// Coefficient of variation of month-level noise.
    pub monthly_cv: f64,
    /// Sub-basin flow as a fraction of river inflow.
    pub sub_basin_fraction: f64,
    pub n_sub_basins: usize,
    /// Random seed for reproducibility (None = entropy)
    pub random_seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_years: 30,
            first_year: 1989,
            mean_inflow_m3s: DEFAULT_MEAN_INFLOW_M3S,
            inter_annual_cv: 0.35,
            monthly_cv: 0.2,
            sub_basin_fraction: 0.4,
            n_sub_basins: 3,
            random_seed: None,
        }
    }
}

pub struct SyntheticHydrology;

impl SyntheticHydrology {
    pub fn generate(config: &SyntheticConfig) -> Result<HistoricalRecord, HydrologyError> {
        let mut rng = match config.random_seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };

        let year_factor = unit_mean_lognormal(config.inter_annual_cv)?;
        let month_noise = unit_mean_lognormal(config.monthly_cv)?;
        let basins = config.n_sub_basins.max(1) as f64;

        let mut years = Vec::with_capacity(config.n_years);
        for i in 0..config.n_years {
            let start = config.first_year + i as i32;
            let wetness = year_factor.sample(&mut rng);

            let mut inflow = [0.0; 12];
            for (q, mean) in inflow.iter_mut().zip(config.mean_inflow_m3s) {
                *q = mean * wetness * month_noise.sample(&mut rng);
            }

            let sub_basins = (0..config.n_sub_basins)
                .map(|_| {
                    let mut series = [0.0; 12];
                    for (s, q) in series.iter_mut().zip(inflow) {
                        *s = q * config.sub_basin_fraction / basins;
                    }
                    series
                })
                .collect();

            years.push(RawYear::complete(
                format!("{}/{}", start, start + 1),
                inflow,
                sub_basins,
            ));
        }

        HistoricalRecord::new(years)
    }
}

/// Lognormal distribution with mean 1 and the given coefficient of variation.
fn unit_mean_lognormal(cv: f64) -> Result<LogNormal<f64>, HydrologyError> {
    let sigma2 = (1.0 + cv.max(0.0).powi(2)).ln();
    LogNormal::new(-sigma2 / 2.0, sigma2.sqrt())
        .map_err(|e| HydrologyError::Load(format!("invalid synthetic variability: {}", e)))
}
