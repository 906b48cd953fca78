use serde::{Deserialize, Serialize};

use super::{PoolStocks, ShareClass, TimeStep};
use crate::allocation::ChainingMode;
use crate::solver::SolveStatus;

/// Per-class flows for one month (Hm³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassFlows {
    /// Demand after the delivery factor is applied.
    pub demand: f64,
    pub fill: f64,
    /// Delivered from the class's own stock.
    pub own_delivery: f64,
    /// Delivered from the reserve pool.
    pub support: f64,
    /// Shortfall against the 50% floor that support could cover.
    pub support_need: f64,
    pub deficit: f64,
}

impl ClassFlows {
    pub fn delivered(&self) -> f64 {
        self.own_delivery + self.support
    }

    /// Served share of demand in percent; an idle month counts as fully served.
    pub fn satisfaction_pct(&self) -> f64 {
        if self.demand > 0.0 {
            self.delivered() / self.demand * 100.0
        } else {
            100.0
        }
    }
}

/// Everything the model decided for one month of a solved scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub step: TimeStep,
    /// Historical year identifier that supplied this month's hydrology.
    pub source_year: String,
    pub inflow: f64,
    pub effective_right: f64,
    pub fill_reserve: f64,
    pub spill: f64,
    pub human_draw: f64,
    pub reserve_available_for_support: f64,
    pub class_a: ClassFlows,
    pub class_b: ClassFlows,
    pub losses: PoolStocks,
    pub opening: PoolStocks,
    pub closing: PoolStocks,
    pub turbined: f64,
}

impl AllocationRecord {
    pub fn remainder(&self) -> f64 {
        self.inflow - self.effective_right
    }

    pub fn class(&self, class: ShareClass) -> &ClassFlows {
        match class {
            ShareClass::A => &self.class_a,
            ShareClass::B => &self.class_b,
        }
    }

    pub fn total_deficit(&self) -> f64 {
        self.class_a.deficit + self.class_b.deficit
    }

    pub fn total_demand(&self) -> f64 {
        self.class_a.demand + self.class_b.demand
    }

    /// Filling-subsystem balance residual; zero when mass is conserved.
    pub fn fill_balance_residual(&self) -> f64 {
        self.fill_reserve + self.class_a.fill + self.class_b.fill + self.spill - self.remainder()
    }
}

/// Solver bookkeeping attached to every solved scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveDiagnostics {
    pub solver: String,
    pub status: SolveStatus,
    pub objective: f64,
    /// Relative optimality gap when the backend reports one.
    pub gap: Option<f64>,
    pub runtime_ms: u64,
}

/// Reduced outcome of one Monte Carlo trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub trial: usize,
    pub seed: u64,
    pub years: Vec<String>,
    pub mode: ChainingMode,
    pub total_deficit: f64,
    pub deficit_a: f64,
    pub deficit_b: f64,
    /// Deficit per sampled year, in sequence order.
    pub annual_deficits: Vec<f64>,
    pub total_demand: f64,
    pub total_turbined: f64,
    pub energy_equivalent: f64,
    pub energy_mwh: f64,
    pub total_spill: f64,
    pub final_stocks: PoolStocks,
    pub diagnostics: SolveDiagnostics,
}

impl ScenarioResult {
    pub fn satisfaction_pct(&self) -> f64 {
        if self.total_demand > 0.0 {
            (self.total_demand - self.total_deficit) / self.total_demand * 100.0
        } else {
            100.0
        }
    }

    pub fn is_suboptimal(&self) -> bool {
        self.diagnostics.status != SolveStatus::Optimal
    }
}
