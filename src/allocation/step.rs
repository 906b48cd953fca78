use serde::{Deserialize, Serialize};

use super::delivery::{self, SupportClaim, SupportSplit};
use super::fill::{allocate_fill, headroom, FillOutcome};
use super::params::{OwnDeliveryPolicy, ReservoirParams};
use crate::domain::{ClassFlows, PoolState, PoolStocks, TimeStep};
use crate::model::ModelError;

/// How much the reserve pool must hand over for human consumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HumanDraw {
    /// Exactly this volume; a shortfall is an error.
    Exact(f64),
    /// As much as the reserve holds, up to this volume.
    AtMost(f64),
}

/// Hydrology and demand of one month, already converted to volumes (Hm³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthInputs {
    pub step: TimeStep,
    pub inflow: f64,
    pub effective_right: f64,
    pub demand_a: f64,
    pub demand_b: f64,
    pub loss_caps: PoolStocks,
}

/// One month of the allocation rules applied to known opening stocks.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthOutcome {
    pub fill: FillOutcome,
    pub losses: PoolStocks,
    pub human_draw: f64,
    pub reserve_available: f64,
    pub state_a: PoolState,
    pub state_b: PoolState,
    pub support: SupportSplit,
    pub class_a: ClassFlows,
    pub class_b: ClassFlows,
    pub opening: PoolStocks,
    pub closing: PoolStocks,
    pub turbined: f64,
}

/// Apply fill, losses, human draw, delivery and support for one month,
/// delivering as much as each class's own pool allows.
pub fn step_month(
    params: &ReservoirParams,
    inputs: &MonthInputs,
    opening: &PoolStocks,
    human: HumanDraw,
) -> Result<MonthOutcome, ModelError> {
    let remainder = inputs.inflow - inputs.effective_right;
    let fill = allocate_fill(
        remainder,
        &headroom(&params.capacities, opening),
        &params.split,
    );
    debug_assert!(fill.residual().abs() <= 1e-9 * remainder.abs().max(1.0));

    let losses = PoolStocks::new(
        inputs.loss_caps.reserve.min(opening.reserve),
        inputs.loss_caps.class_a.min(opening.class_a),
        inputs.loss_caps.class_b.min(opening.class_b),
    );

    let reserve_before_human = opening.reserve - losses.reserve + fill.fill_reserve;
    let human_draw = match human {
        HumanDraw::Exact(v) => {
            if v > reserve_before_human + 1e-9 {
                return Err(ModelError::HumanDrawShortfall {
                    step: inputs.step,
                    required: v,
                    available: reserve_before_human,
                });
            }
            v
        }
        HumanDraw::AtMost(v) => v.min(reserve_before_human).max(0.0),
    };
    let reserve_available = (reserve_before_human - human_draw).max(0.0);

    let available_a = opening.class_a - losses.class_a + fill.fill_a;
    let available_b = opening.class_b - losses.class_b + fill.fill_b;
    let floor = params.support_floor;

    let own_a = own_delivery(params.own_policy, available_a, inputs.demand_a, floor);
    let own_b = own_delivery(params.own_policy, available_b, inputs.demand_b, floor);
    let need_a = delivery::support_need(inputs.demand_a, own_a, floor);
    let need_b = delivery::support_need(inputs.demand_b, own_b, floor);

    let state_a = PoolState::classify(opening.class_a, params.empty_epsilon_hm3);
    let state_b = PoolState::classify(opening.class_b, params.empty_epsilon_hm3);
    let support = delivery::split_support(
        reserve_available,
        SupportClaim::for_state(state_a, need_a, params.split.class_a, reserve_available),
        SupportClaim::for_state(state_b, need_b, params.split.class_b, reserve_available),
    );

    let class_a = ClassFlows {
        demand: inputs.demand_a,
        fill: fill.fill_a,
        own_delivery: own_a,
        support: support.class_a,
        support_need: need_a,
        deficit: delivery::deficit(inputs.demand_a, own_a, support.class_a),
    };
    let class_b = ClassFlows {
        demand: inputs.demand_b,
        fill: fill.fill_b,
        own_delivery: own_b,
        support: support.class_b,
        support_need: need_b,
        deficit: delivery::deficit(inputs.demand_b, own_b, support.class_b),
    };

    let closing = PoolStocks::new(
        reserve_available - support.total,
        (available_a - own_a).max(0.0),
        (available_b - own_b).max(0.0),
    );
    let turbined = delivery::turbined(
        class_a.delivered() + class_b.delivered(),
        human_draw,
        fill.spill,
    );

    Ok(MonthOutcome {
        fill,
        losses,
        human_draw,
        reserve_available,
        state_a,
        state_b,
        support,
        class_a,
        class_b,
        opening: *opening,
        closing,
        turbined,
    })
}

/// Own delivery chosen by the rule-based dispatch. Both policies deliver
/// the maximal volume; under `FloorOnly` that is one admissible choice
/// among many.
fn own_delivery(policy: OwnDeliveryPolicy, available: f64, demand: f64, floor: f64) -> f64 {
    match policy {
        OwnDeliveryPolicy::MaximalOwn | OwnDeliveryPolicy::FloorOnly => {
            let own = delivery::own_maximal(available, demand);
            debug_assert!(own + 1e-9 >= delivery::own_floor(available, demand, floor));
            own
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Month;

    fn params() -> ReservoirParams {
        let mut p = ReservoirParams::default();
        p.human.annual_hm3 = 0.0;
        p
    }

    fn inputs(inflow: f64, right: f64, demand_a: f64, demand_b: f64) -> MonthInputs {
        MonthInputs {
            step: TimeStep::new(0, Month::October),
            inflow,
            effective_right: right,
            demand_a,
            demand_b,
            loss_caps: PoolStocks::zero(),
        }
    }

    #[test]
    fn test_empty_class_gets_half_of_demand_from_reserve() {
        let p = params();
        let opening = PoolStocks::new(100.0, 0.0, 0.0);
        let out = step_month(&p, &inputs(0.0, 0.0, 30.0, 0.0), &opening, HumanDraw::Exact(0.0))
            .unwrap();
        assert_eq!(out.state_a, PoolState::Empty);
        assert_eq!(out.class_a.own_delivery, 0.0);
        assert!((out.class_a.support - 15.0).abs() < 1e-9);
        assert!((out.class_a.deficit - 15.0).abs() < 1e-9);
        assert!((out.closing.reserve - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_own_delivery_at_floor_needs_no_support() {
        let p = params();
        // each class holds more than half of its demand
        let opening = PoolStocks::new(50.0, 12.0, 6.0);
        let out = step_month(&p, &inputs(0.0, 0.0, 20.0, 10.0), &opening, HumanDraw::Exact(0.0))
            .unwrap();
        assert!(out.class_a.own_delivery >= 10.0);
        assert!(out.class_b.own_delivery >= 5.0);
        assert_eq!(out.class_a.support, 0.0);
        assert_eq!(out.class_b.support, 0.0);
        assert_eq!(out.support.total, 0.0);
        assert!((out.closing.reserve - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_class_keeps_its_share_of_a_short_reserve() {
        let p = params();
        // A opens empty; B holds a little water but needs far more support
        let opening = PoolStocks::new(10.0, 0.0, 1.0);
        let out = step_month(&p, &inputs(0.0, 0.0, 20.0, 60.0), &opening, HumanDraw::Exact(0.0))
            .unwrap();
        assert_eq!(out.state_a, PoolState::Empty);
        assert_eq!(out.state_b, PoolState::NonEmpty);
        assert!((out.support.total - 10.0).abs() < 1e-9);
        assert!(out.class_a.support >= p.split.class_a * 10.0 - 1e-9);
    }

    #[test]
    fn test_human_shortfall_is_an_error() {
        let p = params();
        let err = step_month(
            &p,
            &inputs(0.0, 0.0, 0.0, 0.0),
            &PoolStocks::new(1.0, 0.0, 0.0),
            HumanDraw::Exact(2.0),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::HumanDrawShortfall { .. }));

        let out = step_month(
            &p,
            &inputs(0.0, 0.0, 0.0, 0.0),
            &PoolStocks::new(1.0, 0.0, 0.0),
            HumanDraw::AtMost(2.0),
        )
        .unwrap();
        assert_eq!(out.human_draw, 1.0);
        assert_eq!(out.closing.reserve, 0.0);
    }

    #[test]
    fn test_losses_bounded_by_opening_stock() {
        let p = params();
        let mut month = inputs(0.0, 0.0, 0.0, 0.0);
        month.loss_caps = PoolStocks::new(4.0, 4.0, 2.0);
        let out = step_month(&p, &month, &PoolStocks::new(10.0, 1.0, 0.0), HumanDraw::Exact(0.0))
            .unwrap();
        assert_eq!(out.losses, PoolStocks::new(4.0, 1.0, 0.0));
        assert_eq!(out.closing, PoolStocks::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn test_turbined_includes_spill_and_human_draw() {
        let mut p = params();
        p.capacities = PoolStocks::new(0.0, 0.0, 0.0);
        let out = step_month(&p, &inputs(50.0, 10.0, 0.0, 0.0), &PoolStocks::zero(), HumanDraw::Exact(0.0))
            .unwrap();
        assert!((out.fill.spill - 40.0).abs() < 1e-9);
        assert!((out.turbined - 40.0).abs() < 1e-9);
    }
}
