use std::time::Instant;
use tracing::{debug, trace};

use super::{Solution, SolveError, SolveLimits, SolveStatus, SolvingService};
use crate::allocation::{
    delivery, step_month, HumanDraw, HumanDrawSchedule, MonthInputs, MonthOutcome,
    OwnDeliveryPolicy, ReservoirParams, YearChain,
};
use crate::domain::PoolStocks;
use crate::model::{ConstraintModel, FactorTerm, ModelError, PoolVars, StepVars, VarId};

/// Tolerance on the human-consumption volume left undrawn at year end.
const ANNUAL_DRAW_TOLERANCE: f64 = 1e-6;

/// Rule-based backend: walks the horizon month by month and applies the
/// allocation rules to the stocks it carries forward.
///
/// Each class delivers as much as its own pool allows and the reserve
/// covers the remaining need up to the floor. Under an annual human
/// consumption total the draw is taken as early in the year as the reserve
/// allows. When own delivery is pinned to its maximum and the human draw
/// follows fixed monthly fractions this walk is the only feasible point, so
/// the result is optimal; otherwise it is feasible but unproven.
///
/// The walk is a single pass whose cost is linear in the horizon, so
/// [`SolveLimits`] are ignored: there is no search to cut short.
#[derive(Debug, Clone, Default)]
pub struct DispatchSolver;

impl DispatchSolver {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, model: &ConstraintModel) -> Result<Option<Vec<f64>>, SolveError> {
        let frame = &model.frame;
        let params = &frame.params;
        let layout = &model.layout;
        let n_years = frame.n_years();

        if layout.years.len() != n_years || layout.steps.len() != frame.months.len() {
            return Err(SolveError::MalformedModel(format!(
                "layout has {} years / {} steps for a {}-year frame",
                layout.years.len(),
                layout.steps.len(),
                n_years
            )));
        }

        let mut values = vec![0.0; model.num_vars()];
        let mut chain = YearChain::new(frame.mode, params.initial_stocks, n_years);
        let mut closing: Option<PoolStocks> = None;

        while let Some((y, opening)) = chain
            .advance(closing.as_ref())
            .map_err(|e| SolveError::MalformedModel(e.to_string()))?
        {
            let year = &layout.years[y];
            write_pools(&mut values, &year.opening, &opening);

            let factor_a = params.demand.delivery_factor_a.evaluate(opening.class_a);
            let factor_b = params.demand.delivery_factor_b.evaluate(opening.class_b);
            for (term, value) in [(year.factor_a, factor_a), (year.factor_b, factor_b)] {
                if let FactorTerm::Variable(id) = term {
                    set(&mut values, id, value);
                }
            }

            let mut stocks = opening;
            let mut undrawn = params.human.annual_hm3;
            for k in y * 12..(y + 1) * 12 {
                let month = &frame.months[k];
                let vars = &layout.steps[k];
                let inputs = MonthInputs {
                    step: month.step,
                    inflow: month.inflow,
                    effective_right: month.effective_right,
                    demand_a: factor_a * month.nominal_demand_a,
                    demand_b: factor_b * month.nominal_demand_b,
                    loss_caps: month.loss_caps,
                };
                let human = match params.human.schedule {
                    HumanDrawSchedule::MonthlyFractions => HumanDraw::Exact(month.human_target),
                    HumanDrawSchedule::AnnualTotal => HumanDraw::AtMost(undrawn),
                };

                let outcome = match step_month(params, &inputs, &stocks, human) {
                    Ok(outcome) => outcome,
                    Err(e @ ModelError::HumanDrawShortfall { .. }) => {
                        debug!(trial = frame.trial, error = %e, "dispatch infeasible");
                        return Ok(None);
                    }
                    Err(e) => return Err(SolveError::MalformedModel(e.to_string())),
                };
                undrawn -= outcome.human_draw;

                trace!(
                    step = %month.step,
                    deficit = outcome.class_a.deficit + outcome.class_b.deficit,
                    "month dispatched"
                );
                write_step(&mut values, vars, &outcome, params);
                stocks = outcome.closing;
            }

            if undrawn > ANNUAL_DRAW_TOLERANCE {
                debug!(
                    trial = frame.trial,
                    year = y,
                    undrawn,
                    "annual human consumption could not be met"
                );
                return Ok(None);
            }
            closing = Some(stocks);
        }

        Ok(Some(values))
    }
}

impl SolvingService for DispatchSolver {
    fn name(&self) -> &str {
        "dispatch"
    }

    fn solve(&self, model: &ConstraintModel, _limits: &SolveLimits) -> Result<Solution, SolveError> {
        let start = Instant::now();
        let Some(values) = self.run(model)? else {
            return Ok(Solution::infeasible(start.elapsed()));
        };

        let params = &model.frame.params;
        let determined = params.own_policy == OwnDeliveryPolicy::MaximalOwn
            && params.human.schedule == HumanDrawSchedule::MonthlyFractions;

        Ok(Solution {
            status: if determined {
                SolveStatus::Optimal
            } else {
                SolveStatus::Suboptimal
            },
            objective: model.objective_value(&values),
            gap: None,
            runtime: start.elapsed(),
            values,
        })
    }
}

fn set(values: &mut [f64], id: VarId, value: f64) {
    if let Some(slot) = values.get_mut(id.0) {
        *slot = value;
    }
}

fn write_pools(values: &mut [f64], vars: &PoolVars, stocks: &PoolStocks) {
    set(values, vars.reserve, stocks.reserve);
    set(values, vars.class_a, stocks.class_a);
    set(values, vars.class_b, stocks.class_b);
}

fn write_step(values: &mut [f64], vars: &StepVars, out: &MonthOutcome, params: &ReservoirParams) {
    write_pools(values, &vars.losses, &out.losses);
    write_pools(values, &vars.closing, &out.closing);
    set(values, vars.fill_reserve, out.fill.fill_reserve);
    set(values, vars.spill, out.fill.spill);
    set(values, vars.human, out.human_draw);
    set(values, vars.reserve_available, out.reserve_available);
    set(values, vars.support_total, out.support.total);
    set(values, vars.turbined, out.turbined);

    let classes = [
        (
            &vars.class_a,
            &out.class_a,
            out.fill.capped_a,
            out.fill.reassigned_a,
            out.opening.class_a - out.losses.class_a,
            out.state_a,
            params.split.class_a,
        ),
        (
            &vars.class_b,
            &out.class_b,
            out.fill.capped_b,
            out.fill.reassigned_b,
            out.opening.class_b - out.losses.class_b,
            out.state_b,
            params.split.class_b,
        ),
    ];
    for (cv, flows, capped, reassigned, after_losses, state, share) in classes {
        set(values, cv.capped, capped);
        set(values, cv.reassigned, reassigned);
        set(values, cv.fill, flows.fill);
        set(values, cv.own, flows.own_delivery);
        set(values, cv.need, flows.support_need);
        set(values, cv.support, flows.support);
        set(values, cv.deficit, flows.deficit);
        if let Some(id) = cv.own_floor {
            set(
                values,
                id,
                delivery::own_floor(after_losses + flows.fill, flows.demand, params.support_floor),
            );
        }
        if let Some(id) = cv.empty {
            set(values, id, if state.is_empty() { 1.0 } else { 0.0 });
        }
        if let Some(id) = cv.empty_floor {
            set(
                values,
                id,
                delivery::empty_pool_guarantee(flows.support_need, share, out.reserve_available),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::ChainingMode;
    use crate::hydrology::YearHydrology;
    use crate::model::{extract_records, ModelBuilder, Scenario};
    use rstest::rstest;

    fn wet_and_dry() -> Vec<YearHydrology> {
        vec![
            YearHydrology {
                id: "1997/1998".into(),
                inflow: [60.0, 120.0, 200.0, 220.0, 180.0, 160.0, 150.0, 110.0, 80.0, 55.0, 45.0, 40.0],
                sub_basin_total: [40.0; 12],
            },
            YearHydrology {
                id: "1998/1999".into(),
                inflow: [60.0, 65.0, 80.0, 90.0, 85.0, 75.0, 70.0, 60.0, 50.0, 45.0, 40.0, 40.0],
                sub_basin_total: [60.0; 12],
            },
        ]
    }

    fn build(params: &ReservoirParams, mode: ChainingMode) -> ConstraintModel {
        ModelBuilder::new(params)
            .mode(mode)
            .build(&Scenario::new(0, 1, wet_and_dry()))
            .unwrap()
    }

    #[rstest]
    #[case(ChainingMode::Connected, OwnDeliveryPolicy::FloorOnly, HumanDrawSchedule::MonthlyFractions)]
    #[case(ChainingMode::Connected, OwnDeliveryPolicy::MaximalOwn, HumanDrawSchedule::MonthlyFractions)]
    #[case(ChainingMode::Independent, OwnDeliveryPolicy::FloorOnly, HumanDrawSchedule::AnnualTotal)]
    #[case(ChainingMode::Independent, OwnDeliveryPolicy::MaximalOwn, HumanDrawSchedule::AnnualTotal)]
    fn test_dispatch_solution_satisfies_model(
        #[case] mode: ChainingMode,
        #[case] policy: OwnDeliveryPolicy,
        #[case] schedule: HumanDrawSchedule,
    ) {
        let mut params = ReservoirParams::default();
        params.own_policy = policy;
        params.human.schedule = schedule;
        params.initial_stocks = PoolStocks::new(20.0, 30.0, 10.0);
        let model = build(&params, mode);

        let solution = DispatchSolver::new()
            .solve(&model, &SolveLimits::default())
            .unwrap();
        assert!(solution.status.has_solution());
        let violations = model.check(&solution.values, 1e-6);
        assert!(violations.is_empty(), "violations: {:?}", violations);
    }

    #[test]
    fn test_status_reflects_degrees_of_freedom() {
        let mut params = ReservoirParams::default();
        params.initial_stocks = PoolStocks::new(20.0, 0.0, 0.0);
        let floor_only = build(&params, ChainingMode::Connected);
        let s = DispatchSolver::new()
            .solve(&floor_only, &SolveLimits::default())
            .unwrap();
        assert_eq!(s.status, SolveStatus::Suboptimal);

        params.own_policy = OwnDeliveryPolicy::MaximalOwn;
        params.human.schedule = HumanDrawSchedule::MonthlyFractions;
        let maximal = build(&params, ChainingMode::Connected);
        let s = DispatchSolver::new()
            .solve(&maximal, &SolveLimits::default())
            .unwrap();
        assert_eq!(s.status, SolveStatus::Optimal);
    }

    #[test]
    fn test_unmet_human_draw_is_infeasible() {
        let mut params = ReservoirParams::default();
        params.human.annual_hm3 = 10_000.0;
        let model = build(&params, ChainingMode::Connected);
        let s = DispatchSolver::new()
            .solve(&model, &SolveLimits::default())
            .unwrap();
        assert_eq!(s.status, SolveStatus::Infeasible);
        assert!(s.values.is_empty());
    }

    #[test]
    fn test_connected_years_carry_stock() {
        let params = ReservoirParams::default();
        let model = build(&params, ChainingMode::Connected);
        let s = DispatchSolver::new()
            .solve(&model, &SolveLimits::default())
            .unwrap();
        let records = extract_records(&model, &s.values);
        assert_eq!(records.len(), 24);
        assert_eq!(records[12].opening, records[11].closing);
        for r in &records {
            assert!(r.fill_balance_residual().abs() < 1e-6);
            assert!(r.class_a.deficit >= 0.0 && r.class_b.deficit >= 0.0);
        }
    }
}
