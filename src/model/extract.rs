use itertools::Itertools;

use super::problem::ConstraintModel;
use super::scenario::{ClassVars, FactorTerm};
use crate::domain::{AllocationRecord, ClassFlows, PoolStocks, ScenarioResult, SolveDiagnostics};
use crate::solver::Solution;

impl ConstraintModel {
    /// Monthly records of a solution; empty when the solve produced no values.
    pub fn extract_records(&self, solution: &Solution) -> Vec<AllocationRecord> {
        if !solution.status.has_solution() || solution.values.len() != self.num_vars() {
            return Vec::new();
        }
        extract_records(self, &solution.values)
    }
}

/// Read the solved values back as one allocation record per month.
pub fn extract_records(model: &ConstraintModel, values: &[f64]) -> Vec<AllocationRecord> {
    let v = |id: super::VarId| values.get(id.0).copied().unwrap_or(0.0);
    let frame = &model.frame;
    let layout = &model.layout;

    layout
        .steps
        .iter()
        .zip(&frame.months)
        .map(|(vars, month)| {
            let year = &layout.years[vars.step.year];
            let opening = if vars.step.month.is_first() {
                year.opening.values(values)
            } else {
                layout.steps[vars.step.flat_index() - 1].closing.values(values)
            };

            let class_flows = |c: &ClassVars, factor: FactorTerm, nominal: f64| ClassFlows {
                demand: factor.value(values) * nominal,
                fill: v(c.fill),
                own_delivery: v(c.own),
                support: v(c.support),
                support_need: v(c.need),
                deficit: v(c.deficit),
            };

            AllocationRecord {
                step: vars.step,
                source_year: frame.year_ids[vars.step.year].clone(),
                inflow: month.inflow,
                effective_right: month.effective_right,
                fill_reserve: v(vars.fill_reserve),
                spill: v(vars.spill),
                human_draw: v(vars.human),
                reserve_available_for_support: v(vars.reserve_available),
                class_a: class_flows(&vars.class_a, year.factor_a, month.nominal_demand_a),
                class_b: class_flows(&vars.class_b, year.factor_b, month.nominal_demand_b),
                losses: vars.losses.values(values),
                opening,
                closing: vars.closing.values(values),
                turbined: v(vars.turbined),
            }
        })
        .collect()
}

/// Reduce a solved scenario to the figures the Monte Carlo report needs.
pub fn summarize(
    model: &ConstraintModel,
    records: &[AllocationRecord],
    diagnostics: SolveDiagnostics,
) -> ScenarioResult {
    let frame = &model.frame;
    let energy = &frame.params.energy;

    let deficit_a: f64 = records.iter().map(|r| r.class_a.deficit).sum();
    let deficit_b: f64 = records.iter().map(|r| r.class_b.deficit).sum();
    let annual_deficits: Vec<f64> = records
        .iter()
        .chunk_by(|r| r.step.year)
        .into_iter()
        .map(|(_, year)| year.map(AllocationRecord::total_deficit).sum::<f64>())
        .collect();
    let total_turbined: f64 = records.iter().map(|r| r.turbined).sum();
    let energy_equivalent = total_turbined * energy.efficiency;

    ScenarioResult {
        trial: frame.trial,
        seed: frame.seed,
        years: frame.year_ids.clone(),
        mode: frame.mode,
        total_deficit: deficit_a + deficit_b,
        deficit_a,
        deficit_b,
        annual_deficits,
        total_demand: records.iter().map(AllocationRecord::total_demand).sum(),
        total_turbined,
        energy_equivalent,
        energy_mwh: energy_equivalent * energy.mwh_per_hm3,
        total_spill: records.iter().map(|r| r.spill).sum(),
        final_stocks: records
            .last()
            .map(|r| r.closing)
            .unwrap_or_else(PoolStocks::zero),
        diagnostics,
    }
}
