use serde::{Deserialize, Serialize};

use super::expr::{LinExpr, VarId};
use crate::allocation::{ChainingMode, ReservoirParams};
use crate::domain::{Month, PoolStocks, ShareClass, TimeStep};
use crate::hydrology::YearHydrology;

/// A sampled sequence of historical years, one per modelled year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub trial: usize,
    pub seed: u64,
    pub years: Vec<YearHydrology>,
}

impl Scenario {
    pub fn new(trial: usize, seed: u64, years: Vec<YearHydrology>) -> Self {
        Self { trial, seed, years }
    }

    pub fn year_ids(&self) -> Vec<String> {
        self.years.iter().map(|y| y.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Known quantities of one month, in Hm³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthFrame {
    pub step: TimeStep,
    pub inflow: f64,
    pub effective_right: f64,
    /// Demand before the delivery factor.
    pub nominal_demand_a: f64,
    pub nominal_demand_b: f64,
    /// Human draw this month under the monthly-fractions schedule.
    pub human_target: f64,
    pub loss_caps: PoolStocks,
}

impl MonthFrame {
    pub fn remainder(&self) -> f64 {
        (self.inflow - self.effective_right).max(0.0)
    }

    pub fn nominal_demand(&self, class: ShareClass) -> f64 {
        match class {
            ShareClass::A => self.nominal_demand_a,
            ShareClass::B => self.nominal_demand_b,
        }
    }
}

/// Everything a backend needs besides the constraints: the parameters, the
/// sampled years and each month's known flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFrame {
    pub trial: usize,
    pub seed: u64,
    pub mode: ChainingMode,
    pub year_ids: Vec<String>,
    pub params: ReservoirParams,
    /// Flat, `year * 12 + month` order.
    pub months: Vec<MonthFrame>,
}

impl ScenarioFrame {
    pub fn from_scenario(params: &ReservoirParams, scenario: &Scenario, mode: ChainingMode) -> Self {
        let mut months = Vec::with_capacity(scenario.len() * 12);
        for (y, year) in scenario.years.iter().enumerate() {
            let rights = params.rights.effective_volumes_hm3(year);
            for month in Month::all() {
                months.push(MonthFrame {
                    step: TimeStep::new(y, month),
                    inflow: year.inflow_volume_hm3(month),
                    effective_right: rights[month.offset()],
                    nominal_demand_a: params.demand.nominal_hm3(ShareClass::A, month),
                    nominal_demand_b: params.demand.nominal_hm3(ShareClass::B, month),
                    human_target: params.human.monthly_target(month),
                    loss_caps: params.losses.caps(month),
                });
            }
        }

        Self {
            trial: scenario.trial,
            seed: scenario.seed,
            mode,
            year_ids: scenario.year_ids(),
            params: params.clone(),
            months,
        }
    }

    pub fn n_years(&self) -> usize {
        self.year_ids.len()
    }

    pub fn month(&self, step: TimeStep) -> Option<&MonthFrame> {
        self.months.get(step.flat_index())
    }
}

/// One variable per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolVars {
    pub reserve: VarId,
    pub class_a: VarId,
    pub class_b: VarId,
}

impl PoolVars {
    pub fn class(&self, class: ShareClass) -> VarId {
        match class {
            ShareClass::A => self.class_a,
            ShareClass::B => self.class_b,
        }
    }

    pub fn values(&self, values: &[f64]) -> PoolStocks {
        let v = |id: VarId| values.get(id.0).copied().unwrap_or(0.0);
        PoolStocks::new(v(self.reserve), v(self.class_a), v(self.class_b))
    }
}

/// Delivery factor of a class for one year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FactorTerm {
    Fixed(f64),
    Variable(VarId),
}

impl FactorTerm {
    /// Demand expression for a month given its nominal demand.
    pub fn demand(&self, nominal: f64) -> LinExpr {
        match self {
            FactorTerm::Fixed(f) => LinExpr::constant(f * nominal),
            FactorTerm::Variable(id) => LinExpr::term(*id, nominal),
        }
    }

    pub fn value(&self, values: &[f64]) -> f64 {
        match self {
            FactorTerm::Fixed(f) => *f,
            FactorTerm::Variable(id) => values.get(id.0).copied().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearVars {
    pub opening: PoolVars,
    pub factor_a: FactorTerm,
    pub factor_b: FactorTerm,
    /// Opening stocks when they are fixed before solving.
    pub known_opening: Option<PoolStocks>,
}

impl YearVars {
    pub fn factor(&self, class: ShareClass) -> FactorTerm {
        match class {
            ShareClass::A => self.factor_a,
            ShareClass::B => self.factor_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassVars {
    pub capped: VarId,
    pub reassigned: VarId,
    pub fill: VarId,
    pub own: VarId,
    /// `min(available, floor × demand)`; only under the floor-only policy.
    pub own_floor: Option<VarId>,
    pub need: VarId,
    pub support: VarId,
    pub deficit: VarId,
    /// Empty-pool flag when the opening state is not known in advance.
    pub empty: Option<VarId>,
    /// `min(need, share × reserve available)`; absent when the pool is known
    /// to hold water.
    pub empty_floor: Option<VarId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepVars {
    pub step: TimeStep,
    pub losses: PoolVars,
    pub closing: PoolVars,
    pub fill_reserve: VarId,
    pub spill: VarId,
    pub human: VarId,
    pub reserve_available: VarId,
    pub support_total: VarId,
    pub class_a: ClassVars,
    pub class_b: ClassVars,
    pub turbined: VarId,
}

impl StepVars {
    pub fn class(&self, class: ShareClass) -> &ClassVars {
        match class {
            ShareClass::A => &self.class_a,
            ShareClass::B => &self.class_b,
        }
    }
}

/// Where each modelled quantity lives in the variable vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelLayout {
    pub years: Vec<YearVars>,
    /// Flat, `year * 12 + month` order.
    pub steps: Vec<StepVars>,
}

impl ModelLayout {
    /// Opening stock of a step: April reads the year's opening variables,
    /// every other month the previous step's closing variables.
    pub fn previous_stock(&self, step: TimeStep) -> Option<PoolVars> {
        if step.month.is_first() {
            self.years.get(step.year).map(|y| y.opening)
        } else {
            self.steps.get(step.flat_index() - 1).map(|s| s.closing)
        }
    }
}
