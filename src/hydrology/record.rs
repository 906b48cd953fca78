use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path};
use tracing::warn;

use super::{HydrologyError, HydrologyProvider, YearHydrology};
use crate::domain::Month;

/// One historical year as it arrives from the data source. `None` marks a
/// month the source did not record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawYear {
    pub id: String,
    pub inflow: Vec<Option<f64>>,
    /// One 12-month series per sub-basin.
    #[serde(default)]
    pub sub_basins: Vec<Vec<Option<f64>>>,
}

impl RawYear {
    pub fn complete(id: impl Into<String>, inflow: [f64; 12], sub_basins: Vec<[f64; 12]>) -> Self {
        Self {
            id: id.into(),
            inflow: inflow.iter().copied().map(Some).collect(),
            sub_basins: sub_basins
                .into_iter()
                .map(|s| s.iter().copied().map(Some).collect())
                .collect(),
        }
    }
}

/// In-memory snapshot of the historical flow record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub years: Vec<RawYear>,
    /// Substitute zero for missing months instead of failing. Off unless
    /// explicitly configured.
    #[serde(default)]
    pub fill_missing_with_zero: bool,
}

impl HistoricalRecord {
    pub fn new(years: Vec<RawYear>) -> Result<Self, HydrologyError> {
        let mut seen = HashSet::new();
        for y in &years {
            if !seen.insert(y.id.as_str()) {
                return Err(HydrologyError::DuplicateYear(y.id.clone()));
            }
        }
        Ok(Self {
            years,
            fill_missing_with_zero: false,
        })
    }

    pub fn with_zero_fill(mut self, enabled: bool) -> Self {
        self.fill_missing_with_zero = enabled;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, HydrologyError> {
        let parsed: HistoricalRecord =
            serde_json::from_str(json).map_err(|e| HydrologyError::Load(e.to_string()))?;
        let fill = parsed.fill_missing_with_zero;
        Ok(Self::new(parsed.years)?.with_zero_fill(fill))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HydrologyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HydrologyError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    fn validate_series(
        &self,
        year: &str,
        series: &str,
        values: &[Option<f64>],
    ) -> Result<[f64; 12], HydrologyError> {
        if values.len() != 12 {
            return Err(HydrologyError::SeriesLength {
                year: year.to_string(),
                series: series.to_string(),
                len: values.len(),
            });
        }

        let mut out = [0.0; 12];
        for month in Month::all() {
            let value = match values[month.offset()] {
                Some(v) => v,
                None if self.fill_missing_with_zero => {
                    warn!(year, series, %month, "missing month replaced with zero flow");
                    0.0
                }
                None => {
                    return Err(HydrologyError::MissingMonth {
                        year: year.to_string(),
                        series: series.to_string(),
                        month,
                    })
                }
            };
            if !value.is_finite() || value < 0.0 {
                return Err(HydrologyError::InvalidValue {
                    year: year.to_string(),
                    series: series.to_string(),
                    month,
                    value,
                });
            }
            out[month.offset()] = value;
        }
        Ok(out)
    }
}

impl HydrologyProvider for HistoricalRecord {
    fn year_ids(&self) -> Vec<String> {
        self.years.iter().map(|y| y.id.clone()).collect()
    }

    fn year(&self, id: &str) -> Result<YearHydrology, HydrologyError> {
        let raw = self
            .years
            .iter()
            .find(|y| y.id == id)
            .ok_or_else(|| HydrologyError::UnknownYear(id.to_string()))?;

        let inflow = self.validate_series(id, "inflow", &raw.inflow)?;

        let mut sub_basin_total = [0.0; 12];
        for (i, basin) in raw.sub_basins.iter().enumerate() {
            let series = self.validate_series(id, &format!("sub_basin_{}", i + 1), basin)?;
            for (total, v) in sub_basin_total.iter_mut().zip(series) {
                *total += v;
            }
        }

        Ok(YearHydrology {
            id: raw.id.clone(),
            inflow,
            sub_basin_total,
        })
    }
}
