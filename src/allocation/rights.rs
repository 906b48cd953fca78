use serde::{Deserialize, Serialize};

use crate::domain::Month;
use crate::hydrology::YearHydrology;
use crate::model::ModelError;

/// Legal water rights downstream of the dam, April..March (m³/s).
const DEFAULT_LEGAL_M3S: [f64; 12] = [
    52.00, 52.00, 52.00, 52.00, 52.00, 57.70, 76.22, 69.22, 52.00, 52.00, 52.00, 52.00,
];

/// Ecological minimum flow, April..March (m³/s).
const DEFAULT_ECOLOGICAL_M3S: [f64; 12] = [
    17.60, 10.00, 10.35, 14.48, 15.23, 15.23, 15.23, 15.23, 15.23, 12.80, 15.20, 16.40,
];

/// Flow the river must carry below the sub-basin confluences (m³/s).
const DEFAULT_BASELINE_THRESHOLD_M3S: f64 = 95.7;

/// Month-indexed minimum-flow obligations that bypass storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RightsTable {
    pub legal_m3s: [f64; 12],
    pub ecological_m3s: [f64; 12],
    pub baseline_threshold_m3s: f64,
}

impl Default for RightsTable {
    fn default() -> Self {
        Self {
            legal_m3s: DEFAULT_LEGAL_M3S,
            ecological_m3s: DEFAULT_ECOLOGICAL_M3S,
            baseline_threshold_m3s: DEFAULT_BASELINE_THRESHOLD_M3S,
        }
    }
}

impl RightsTable {
    /// A table with no obligations at all.
    pub fn none() -> Self {
        Self {
            legal_m3s: [0.0; 12],
            ecological_m3s: [0.0; 12],
            baseline_threshold_m3s: 0.0,
        }
    }

    /// Binding requirement before it is capped by inflow (m³/s).
    pub fn nominal(&self, month: Month, sub_basin_total: f64) -> f64 {
        let i = month.offset();
        let basin_shortfall = (self.baseline_threshold_m3s - sub_basin_total).max(0.0);
        self.legal_m3s[i].max(self.ecological_m3s[i]).max(basin_shortfall)
    }

    /// Effective right: the nominal requirement capped by the month's inflow.
    /// Never exceeds inflow, and is zero when the river is dry.
    pub fn effective(&self, month: Month, inflow: f64, sub_basin_total: f64) -> f64 {
        self.nominal(month, sub_basin_total).min(inflow.max(0.0))
    }

    /// Effective right for every month of a year, as volumes (Hm³).
    pub fn effective_volumes_hm3(&self, year: &YearHydrology) -> [f64; 12] {
        let mut out = [0.0; 12];
        for month in Month::all() {
            let rate = self.effective(month, year.inflow(month), year.sub_basin(month));
            out[month.offset()] = month.flow_to_volume_hm3(rate);
        }
        out
    }

    pub(crate) fn check(&self) -> Result<(), ModelError> {
        let bad = self
            .legal_m3s
            .iter()
            .chain(self.ecological_m3s.iter())
            .chain(std::iter::once(&self.baseline_threshold_m3s))
            .any(|v| !v.is_finite() || *v < 0.0);
        if bad {
            return Err(ModelError::InvalidParameter(
                "rights tables must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    // legal right dominates
    #[case(Month::October, 300.0, 90.0, 76.22)]
    // basin shortfall dominates: 95.7 - 10 = 85.7
    #[case(Month::April, 300.0, 10.0, 85.7)]
    // capped by inflow
    #[case(Month::October, 40.0, 90.0, 40.0)]
    // dry river
    #[case(Month::January, 0.0, 0.0, 0.0)]
    fn test_effective_right(
        #[case] month: Month,
        #[case] inflow: f64,
        #[case] sub_basins: f64,
        #[case] expected: f64,
    ) {
        let rights = RightsTable::default();
        let right = rights.effective(month, inflow, sub_basins);
        assert!((right - expected).abs() < 1e-9, "got {}", right);
        assert!(right <= inflow);
    }

    #[test]
    fn test_ecological_flow_can_bind() {
        let rights = RightsTable {
            legal_m3s: [5.0; 12],
            ecological_m3s: [8.0; 12],
            baseline_threshold_m3s: 0.0,
        };
        assert_eq!(rights.effective(Month::May, 100.0, 50.0), 8.0);
    }

    #[test]
    fn test_effective_volumes_never_exceed_inflow_volume() {
        let year = YearHydrology {
            id: "1998/1999".into(),
            inflow: [30.0, 60.0, 90.0, 120.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0, 5.0, 0.0],
            sub_basin_total: [20.0; 12],
        };
        let volumes = RightsTable::default().effective_volumes_hm3(&year);
        for month in Month::all() {
            assert!(volumes[month.offset()] <= year.inflow_volume_hm3(month) + 1e-12);
        }
        assert_eq!(volumes[Month::March.offset()], 0.0);
    }
}
