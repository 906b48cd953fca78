use serde::{Deserialize, Serialize};
use validator::Validate;

use super::rights::RightsTable;
use crate::domain::{Month, PoolStocks, ShareClass, M3_PER_HM3};
use crate::model::{ModelError, PiecewiseLinear};

/// Per-share monthly irrigation volume for class A (m³ per share, April..March).
const DEFAULT_PER_SHARE_A_M3: [f64; 12] = [
    776.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2444.0, 6516.0, 9580.0, 9503.0, 6516.0, 3452.0,
];

/// Per-share monthly irrigation volume for class B (m³ per share, April..March).
const DEFAULT_PER_SHARE_B_M3: [f64; 12] = [
    274.0, 0.0, 0.0, 0.0, 0.0, 0.0, 864.0, 2305.0, 3388.0, 3361.0, 2305.0, 1221.0,
];

/// Share of the annual human-consumption volume drawn each month (April..March).
const DEFAULT_HUMAN_FRACTIONS: [f64; 12] = [
    0.05, 0.10, 0.10, 0.15, 0.20, 0.15, 0.10, 0.10, 0.05, 0.0, 0.0, 0.0,
];

const TOLERANCE: f64 = 1e-9;

/// Nominal split of the water not absorbed by the reserve pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ShareSplit {
    #[validate(range(min = 0.0, max = 1.0))]
    pub class_a: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub class_b: f64,
}

impl ShareSplit {
    pub fn of(&self, class: ShareClass) -> f64 {
        match class {
            ShareClass::A => self.class_a,
            ShareClass::B => self.class_b,
        }
    }
}

impl Default for ShareSplit {
    fn default() -> Self {
        Self {
            class_a: 0.71,
            class_b: 0.29,
        }
    }
}

/// Scaling applied to nominal demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryFactor {
    Fixed { value: f64 },
    /// Factor read from a curve of the class's April opening stock plus a
    /// forecast volume (both Hm³).
    StorageCurve {
        breakpoints: Vec<(f64, f64)>,
        forecast_volume_hm3: f64,
    },
}

impl Default for DeliveryFactor {
    fn default() -> Self {
        DeliveryFactor::Fixed { value: 1.0 }
    }
}

impl DeliveryFactor {
    pub fn curve(&self) -> Option<(PiecewiseLinear, f64)> {
        match self {
            DeliveryFactor::Fixed { .. } => None,
            DeliveryFactor::StorageCurve {
                breakpoints,
                forecast_volume_hm3,
            } => Some((PiecewiseLinear::new(breakpoints.clone()), *forecast_volume_hm3)),
        }
    }

    /// Factor for a year given the class's opening stock.
    pub fn evaluate(&self, opening_stock: f64) -> f64 {
        match self {
            DeliveryFactor::Fixed { value } => *value,
            DeliveryFactor::StorageCurve {
                breakpoints,
                forecast_volume_hm3,
            } => PiecewiseLinear::new(breakpoints.clone()).eval(opening_stock + forecast_volume_hm3),
        }
    }

    fn check(&self, class: ShareClass) -> Result<(), ModelError> {
        match self {
            DeliveryFactor::Fixed { value } => {
                if !(0.0..=1.0).contains(value) {
                    return Err(ModelError::InvalidParameter(format!(
                        "delivery factor for class {} must be within [0, 1], got {}",
                        class, value
                    )));
                }
            }
            DeliveryFactor::StorageCurve {
                breakpoints,
                forecast_volume_hm3,
            } => {
                if breakpoints.len() < 2 {
                    return Err(ModelError::InvalidParameter(format!(
                        "delivery curve for class {} needs at least two breakpoints",
                        class
                    )));
                }
                if breakpoints.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return Err(ModelError::InvalidParameter(format!(
                        "delivery curve for class {} must have strictly increasing x",
                        class
                    )));
                }
                if breakpoints.iter().any(|(_, y)| !(0.0..=1.0).contains(y)) {
                    return Err(ModelError::InvalidParameter(format!(
                        "delivery curve for class {} must map into [0, 1]",
                        class
                    )));
                }
                if !forecast_volume_hm3.is_finite() {
                    return Err(ModelError::InvalidParameter(
                        "forecast_volume_hm3 is not finite".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Irrigation demand: per-share monthly volumes times the number of shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandTable {
    pub per_share_a_m3: [f64; 12],
    pub per_share_b_m3: [f64; 12],
    pub shares_a: u32,
    pub shares_b: u32,
    #[serde(default)]
    pub delivery_factor_a: DeliveryFactor,
    #[serde(default)]
    pub delivery_factor_b: DeliveryFactor,
}

impl Default for DemandTable {
    fn default() -> Self {
        Self {
            per_share_a_m3: DEFAULT_PER_SHARE_A_M3,
            per_share_b_m3: DEFAULT_PER_SHARE_B_M3,
            shares_a: 21_221,
            shares_b: 7_100,
            delivery_factor_a: DeliveryFactor::default(),
            delivery_factor_b: DeliveryFactor::default(),
        }
    }
}

impl DemandTable {
    /// Demand before the delivery factor (Hm³).
    pub fn nominal_hm3(&self, class: ShareClass, month: Month) -> f64 {
        let (table, shares) = match class {
            ShareClass::A => (&self.per_share_a_m3, self.shares_a),
            ShareClass::B => (&self.per_share_b_m3, self.shares_b),
        };
        table[month.offset()] * shares as f64 / M3_PER_HM3
    }

    pub fn delivery_factor(&self, class: ShareClass) -> &DeliveryFactor {
        match class {
            ShareClass::A => &self.delivery_factor_a,
            ShareClass::B => &self.delivery_factor_b,
        }
    }

    /// A demand table with the same volume every month; handy for scenarios
    /// expressed directly in Hm³.
    pub fn flat_hm3(class_a_hm3: f64, class_b_hm3: f64) -> Self {
        Self {
            per_share_a_m3: [class_a_hm3 * M3_PER_HM3; 12],
            per_share_b_m3: [class_b_hm3 * M3_PER_HM3; 12],
            shares_a: 1,
            shares_b: 1,
            delivery_factor_a: DeliveryFactor::default(),
            delivery_factor_b: DeliveryFactor::default(),
        }
    }
}

/// When the annual human-consumption volume leaves the reserve pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanDrawSchedule {
    /// Monthly draws sum to the annual volume; timing is a decision.
    AnnualTotal,
    /// Each month draws annual volume × that month's fraction.
    MonthlyFractions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HumanConsumption {
    #[validate(range(min = 0.0))]
    pub annual_hm3: f64,
    pub schedule: HumanDrawSchedule,
    pub monthly_fractions: [f64; 12],
}

impl Default for HumanConsumption {
    fn default() -> Self {
        Self {
            annual_hm3: 3.9,
            schedule: HumanDrawSchedule::AnnualTotal,
            monthly_fractions: DEFAULT_HUMAN_FRACTIONS,
        }
    }
}

impl HumanConsumption {
    pub fn monthly_target(&self, month: Month) -> f64 {
        self.annual_hm3 * self.monthly_fractions[month.offset()]
    }
}

/// Evaporation/seepage losses. Each pool loses `min(weight × monthly loss,
/// opening stock)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    pub monthly_hm3: [f64; 12],
    pub weights: PoolStocks,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            monthly_hm3: [0.0; 12],
            weights: PoolStocks::new(0.4, 0.4, 0.2),
        }
    }
}

impl LossConfig {
    pub fn caps(&self, month: Month) -> PoolStocks {
        let loss = self.monthly_hm3[month.offset()];
        PoolStocks::new(
            self.weights.reserve * loss,
            self.weights.class_a * loss,
            self.weights.class_b * loss,
        )
    }

    pub fn is_zero(&self) -> bool {
        self.monthly_hm3.iter().all(|l| *l == 0.0)
    }
}

/// How much a class draws from its own pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnDeliveryPolicy {
    /// Own delivery must reach `min(available, floor × demand)`; anything
    /// above is left to the solver.
    FloorOnly,
    /// Own delivery is `min(demand, available)`.
    MaximalOwn,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EnergyConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub efficiency: f64,
    #[validate(range(min = 0.0))]
    pub mwh_per_hm3: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            efficiency: 0.85,
            mwh_per_hm3: 0.0,
        }
    }
}

/// Tie-break weights added to the total-deficit objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObjectiveWeights {
    #[validate(range(min = 0.0))]
    pub support_penalty: f64,
    #[validate(range(min = 0.0))]
    pub own_reward: f64,
    #[validate(range(min = 0.0))]
    pub stock_penalty: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            support_penalty: 1e-3,
            own_reward: 1e-3,
            stock_penalty: 1e-6,
        }
    }
}

/// Physical, legal and policy data of the reservoir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReservoirParams {
    pub capacities: PoolStocks,
    pub initial_stocks: PoolStocks,
    #[validate(nested)]
    pub split: ShareSplit,
    pub rights: RightsTable,
    pub demand: DemandTable,
    /// Fraction of demand that reserve support can top up to.
    #[validate(range(min = 0.0, max = 1.0))]
    pub support_floor: f64,
    #[validate(nested)]
    pub human: HumanConsumption,
    pub losses: LossConfig,
    pub own_policy: OwnDeliveryPolicy,
    /// Stock at or below this volume counts as an empty pool (Hm³).
    #[validate(range(min = 0.0))]
    pub empty_epsilon_hm3: f64,
    #[validate(nested)]
    pub energy: EnergyConfig,
    #[validate(nested)]
    pub objective: ObjectiveWeights,
}

impl Default for ReservoirParams {
    fn default() -> Self {
        Self {
            capacities: PoolStocks::new(175.0, 260.0, 105.0),
            initial_stocks: PoolStocks::zero(),
            split: ShareSplit::default(),
            rights: RightsTable::default(),
            demand: DemandTable::default(),
            support_floor: 0.5,
            human: HumanConsumption::default(),
            losses: LossConfig::default(),
            own_policy: OwnDeliveryPolicy::FloorOnly,
            empty_epsilon_hm3: 1e-6,
            energy: EnergyConfig::default(),
            objective: ObjectiveWeights::default(),
        }
    }
}

impl ReservoirParams {
    /// Demand after applying a delivery factor (Hm³).
    pub fn demand_hm3(&self, class: ShareClass, month: Month, factor: f64) -> f64 {
        self.demand.nominal_hm3(class, month) * factor
    }

    /// Validate parameters for consistency before any model is built.
    pub fn ensure_valid(&self) -> Result<(), ModelError> {
        self.validate()
            .map_err(|e| ModelError::InvalidParameter(e.to_string()))?;

        for (label, stocks) in [
            ("capacities", &self.capacities),
            ("initial_stocks", &self.initial_stocks),
            ("loss weights", &self.losses.weights),
        ] {
            if [stocks.reserve, stocks.class_a, stocks.class_b]
                .iter()
                .any(|v| !v.is_finite() || *v < 0.0)
            {
                return Err(ModelError::InvalidParameter(format!(
                    "{} must be finite and non-negative",
                    label
                )));
            }
        }

        for pool in crate::domain::Pool::all() {
            if self.initial_stocks.get(pool) > self.capacities.get(pool) + TOLERANCE {
                return Err(ModelError::InvalidParameter(format!(
                    "initial stock of {} exceeds its capacity",
                    pool
                )));
            }
        }

        if (self.split.class_a + self.split.class_b - 1.0).abs() > TOLERANCE {
            return Err(ModelError::InvalidParameter(format!(
                "share split must sum to 1, got {} + {}",
                self.split.class_a, self.split.class_b
            )));
        }

        if !self.losses.is_zero()
            && (self.losses.weights.total() - 1.0).abs() > TOLERANCE
        {
            return Err(ModelError::InvalidParameter(
                "loss weights must sum to 1".to_string(),
            ));
        }
        if self.losses.monthly_hm3.iter().any(|l| !l.is_finite() || *l < 0.0) {
            return Err(ModelError::InvalidParameter(
                "monthly losses must be finite and non-negative".to_string(),
            ));
        }

        if self.human.schedule == HumanDrawSchedule::MonthlyFractions
            || self.human.annual_hm3 > 0.0
        {
            let total: f64 = self.human.monthly_fractions.iter().sum();
            if self.human.monthly_fractions.iter().any(|f| *f < 0.0)
                || (total - 1.0).abs() > 1e-6
            {
                return Err(ModelError::InvalidParameter(format!(
                    "human consumption fractions must be non-negative and sum to 1, got {}",
                    total
                )));
            }
        }

        for table in [&self.demand.per_share_a_m3, &self.demand.per_share_b_m3] {
            if table.iter().any(|d| !d.is_finite() || *d < 0.0) {
                return Err(ModelError::InvalidParameter(
                    "demand tables must be finite and non-negative".to_string(),
                ));
            }
        }

        self.demand.delivery_factor_a.check(ShareClass::A)?;
        self.demand.delivery_factor_b.check(ShareClass::B)?;
        self.rights.check()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        ReservoirParams::default().ensure_valid().unwrap();
    }

    #[test]
    fn test_default_demand_matches_per_share_tables() {
        let params = ReservoirParams::default();
        // December: 9580 m³/share × 21 221 shares
        let dec_a = params.demand.nominal_hm3(ShareClass::A, Month::December);
        assert!((dec_a - 9580.0 * 21_221.0 / 1e6).abs() < 1e-9);
        // No irrigation in winter
        assert_eq!(params.demand.nominal_hm3(ShareClass::B, Month::July), 0.0);
    }

    #[test]
    fn test_split_must_sum_to_one() {
        let mut params = ReservoirParams::default();
        params.split.class_b = 0.35;
        assert!(params.ensure_valid().is_err());
    }

    #[test]
    fn test_initial_stock_above_capacity_rejected() {
        let mut params = ReservoirParams::default();
        params.initial_stocks.class_b = 200.0;
        assert!(params.ensure_valid().is_err());
    }

    #[test]
    fn test_human_fractions_must_sum_to_one() {
        let mut params = ReservoirParams::default();
        params.human.monthly_fractions[0] = 0.5;
        assert!(params.ensure_valid().is_err());
    }

    #[test]
    fn test_delivery_curve_validation() {
        let mut params = ReservoirParams::default();
        params.demand.delivery_factor_a = DeliveryFactor::StorageCurve {
            breakpoints: vec![(0.0, 0.5), (0.0, 1.0)],
            forecast_volume_hm3: 0.0,
        };
        assert!(params.ensure_valid().is_err());

        params.demand.delivery_factor_a = DeliveryFactor::StorageCurve {
            breakpoints: vec![(0.0, 0.5), (200.0, 1.0)],
            forecast_volume_hm3: 50.0,
        };
        params.ensure_valid().unwrap();
        let fe = params.demand.delivery_factor_a.evaluate(50.0);
        assert!((fe - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_loss_caps_follow_weights() {
        let mut losses = LossConfig::default();
        losses.monthly_hm3[Month::January.offset()] = 10.0;
        let caps = losses.caps(Month::January);
        assert!((caps.reserve - 4.0).abs() < 1e-12);
        assert!((caps.class_b - 2.0).abs() < 1e-12);
        assert_eq!(losses.caps(Month::April).total(), 0.0);
    }
}
