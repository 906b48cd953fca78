//! # Hydrology Provider
//!
//! Supplies, per historical hydrological year, the twelve monthly mean flow
//! rates (m³/s, April..March) of the main river and the summed sub-basin
//! flows. Missing months are surfaced as errors; zero-filling only happens
//! when the record was explicitly configured to allow it.

pub mod record;
pub mod synthetic;

pub use record::{HistoricalRecord, RawYear};
pub use synthetic::{SyntheticConfig, SyntheticHydrology};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Month;

/// Hydrology input errors. Raised before any model is assembled.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HydrologyError {
    #[error("historical year {0} is not in the record")]
    UnknownYear(String),
    #[error("year {year}: {series} series has no value for {month}")]
    MissingMonth {
        year: String,
        series: String,
        month: Month,
    },
    #[error("year {year}: {series} value for {month} is not a finite non-negative flow: {value}")]
    InvalidValue {
        year: String,
        series: String,
        month: Month,
        value: f64,
    },
    #[error("year {year}: {series} series has {len} values, expected 12")]
    SeriesLength {
        year: String,
        series: String,
        len: usize,
    },
    #[error("duplicate historical year {0}")]
    DuplicateYear(String),
    #[error("failed to load historical record: {0}")]
    Load(String),
}

/// Validated monthly hydrology of one historical year (m³/s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearHydrology {
    pub id: String,
    pub inflow: [f64; 12],
    /// Sum of all sub-basin flows for each month.
    pub sub_basin_total: [f64; 12],
}

impl YearHydrology {
    pub fn inflow(&self, month: Month) -> f64 {
        self.inflow[month.offset()]
    }

    pub fn sub_basin(&self, month: Month) -> f64 {
        self.sub_basin_total[month.offset()]
    }

    pub fn inflow_volume_hm3(&self, month: Month) -> f64 {
        month.flow_to_volume_hm3(self.inflow(month))
    }
}

/// Source of historical hydrology. Implementations must be shareable across
/// Monte Carlo workers as a read-only snapshot.
pub trait HydrologyProvider: Send + Sync {
    /// Identifiers of every year available for sampling, in record order.
    fn year_ids(&self) -> Vec<String>;

    /// Validated series for one year.
    fn year(&self, id: &str) -> Result<YearHydrology, HydrologyError>;

    /// Fetch a whole sequence, failing on the first bad year.
    fn sequence(&self, ids: &[String]) -> Result<Vec<YearHydrology>, HydrologyError> {
        ids.iter().map(|id| self.year(id)).collect()
    }
}
