//! Assembles the constraint model of one scenario.
//!
//! Per month the model states, in order: losses, the priority fill of the
//! reserve and the two classes, the human draw, own delivery, reserve
//! support up to the floor, deficits, closing stocks and turbined volume.
//! Years are linked through explicit opening-stock variables.

use tracing::debug;

use super::constraints::{LinearConstraint, PiecewiseLinear, Sense};
use super::expr::{LinExpr, VarId};
use super::problem::ConstraintModel;
use super::scenario::{
    ClassVars, FactorTerm, ModelLayout, MonthFrame, PoolVars, Scenario, ScenarioFrame, StepVars,
    YearVars,
};
use super::ModelError;
use crate::allocation::{
    ChainingMode, DeliveryFactor, HumanDrawSchedule, OpeningSource, OwnDeliveryPolicy,
    ReservoirParams, YearChain,
};
use crate::domain::{PoolState, PoolStocks, ShareClass};

/// Builds a [`ConstraintModel`] from parameters and a sampled scenario.
#[derive(Debug, Clone)]
pub struct ModelBuilder<'a> {
    params: &'a ReservoirParams,
    mode: ChainingMode,
}

/// Quantities of one class in the month being built.
struct ClassTerms {
    prev: VarId,
    capped: VarId,
    reassigned: VarId,
    loss: VarId,
    fill: VarId,
    demand: LinExpr,
    reserve_available: VarId,
    known_state: Option<PoolState>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(params: &'a ReservoirParams) -> Self {
        Self {
            params,
            mode: ChainingMode::default(),
        }
    }

    pub fn mode(mut self, mode: ChainingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(&self, scenario: &Scenario) -> Result<ConstraintModel, ModelError> {
        if scenario.is_empty() {
            return Err(ModelError::EmptyScenario);
        }
        self.params.ensure_valid()?;

        let frame = ScenarioFrame::from_scenario(self.params, scenario, self.mode);
        let big_m = big_m(self.params, &frame);
        let months = frame.months.clone();
        let n_years = frame.n_years();

        let mut model = ConstraintModel::new(format!("trial-{}", scenario.trial), frame, big_m);
        let mut layout = ModelLayout::default();
        let mut objective = LinExpr::zero();
        let chain = YearChain::new(self.mode, self.params.initial_stocks, n_years);

        for y in 0..n_years {
            let year = self.add_year(&mut model, &layout, &chain, y)?;
            let mut annual_human = Vec::with_capacity(12);

            for frame in &months[y * 12..(y + 1) * 12] {
                let (prev, known) = if frame.step.month.is_first() {
                    (year.opening, year.known_opening)
                } else {
                    let closing = layout.steps.last().map(|s| s.closing);
                    (closing.unwrap_or(year.opening), None)
                };
                let step = self.add_month(&mut model, frame, &year, prev, known, &mut objective);
                annual_human.push(step.human);
                layout.steps.push(step);
            }

            if self.params.human.schedule == HumanDrawSchedule::AnnualTotal {
                model.add_eq(
                    format!("human_annual[{}]", y),
                    LinExpr::sum(annual_human),
                    self.params.human.annual_hm3,
                );
            }
            layout.years.push(year);
        }

        model.set_objective(objective);
        model.layout = layout;

        debug!(
            trial = scenario.trial,
            years = n_years,
            mode = %self.mode,
            variables = model.num_vars(),
            binaries = model.num_binaries(),
            constraints = model.constraints().len(),
            "constraint model built"
        );

        Ok(model)
    }

    fn add_year(
        &self,
        model: &mut ConstraintModel,
        layout: &ModelLayout,
        chain: &YearChain,
        y: usize,
    ) -> Result<YearVars, ModelError> {
        let caps = &self.params.capacities;
        let opening = PoolVars {
            reserve: model.add_var(format!("open_r[{}]", y), 0.0, caps.reserve),
            class_a: model.add_var(format!("open_a[{}]", y), 0.0, caps.class_a),
            class_b: model.add_var(format!("open_b[{}]", y), 0.0, caps.class_b),
        };

        let known_opening = match chain.opening_source(y) {
            OpeningSource::Fixed(stocks) => {
                fix_pools(model, &format!("open_fixed[{}]", y), &opening, &stocks);
                Some(stocks)
            }
            OpeningSource::CarriedFrom(prev) => {
                let closing = layout
                    .steps
                    .get(prev * 12 + 11)
                    .map(|s| s.closing)
                    .ok_or(ModelError::ChainBroken { year: prev })?;
                let name = format!("open_carry[{}]", y);
                model.add_eq(format!("{}:r", name), opening.reserve, closing.reserve);
                model.add_eq(format!("{}:a", name), opening.class_a, closing.class_a);
                model.add_eq(format!("{}:b", name), opening.class_b, closing.class_b);
                None
            }
        };

        let factor_a = self.add_factor(model, ShareClass::A, y, opening.class_a);
        let factor_b = self.add_factor(model, ShareClass::B, y, opening.class_b);

        Ok(YearVars {
            opening,
            factor_a,
            factor_b,
            known_opening,
        })
    }

    fn add_factor(
        &self,
        model: &mut ConstraintModel,
        class: ShareClass,
        y: usize,
        opening: VarId,
    ) -> FactorTerm {
        match self.params.demand.delivery_factor(class) {
            DeliveryFactor::Fixed { value } => FactorTerm::Fixed(*value),
            DeliveryFactor::StorageCurve {
                breakpoints,
                forecast_volume_hm3,
            } => {
                let fe = model.add_var(format!("fe_{}[{}]", class, y), 0.0, 1.0);
                let curve = PiecewiseLinear::new(breakpoints.clone()).covering(
                    *forecast_volume_hm3,
                    self.params.capacities.class(class) + forecast_volume_hm3,
                );
                model.add_piecewise(
                    format!("fe_curve_{}[{}]", class, y),
                    LinExpr::var(opening) + *forecast_volume_hm3,
                    fe,
                    curve,
                );
                FactorTerm::Variable(fe)
            }
        }
    }

    fn add_month(
        &self,
        model: &mut ConstraintModel,
        frame: &MonthFrame,
        year: &YearVars,
        prev: PoolVars,
        known_opening: Option<PoolStocks>,
        objective: &mut LinExpr,
    ) -> StepVars {
        let p = &self.params;
        let step = frame.step;
        let caps = &p.capacities;
        let tag = |label: &str| format!("{}[{}]", label, step);

        // Losses
        let losses = PoolVars {
            reserve: add_loss(model, tag("loss_r"), frame.loss_caps.reserve, prev.reserve),
            class_a: add_loss(model, tag("loss_a"), frame.loss_caps.class_a, prev.class_a),
            class_b: add_loss(model, tag("loss_b"), frame.loss_caps.class_b, prev.class_b),
        };

        // Priority fill
        let remainder = frame.remainder();
        let head = |cap: f64, stock: VarId| LinExpr::constant(cap) - stock;
        let fill_reserve = model.add_nonneg(tag("fill_r"));
        model.add_min(
            tag("fill_r"),
            fill_reserve,
            vec![LinExpr::constant(remainder), head(caps.reserve, prev.reserve)],
        );
        let leftover = LinExpr::constant(remainder) - fill_reserve;

        let capped_a = model.add_nonneg(tag("capped_a"));
        let capped_b = model.add_nonneg(tag("capped_b"));
        model.add_min(
            tag("capped_a"),
            capped_a,
            vec![leftover.clone() * p.split.class_a, head(caps.class_a, prev.class_a)],
        );
        model.add_min(
            tag("capped_b"),
            capped_b,
            vec![leftover.clone() * p.split.class_b, head(caps.class_b, prev.class_b)],
        );

        let overflow_a = leftover.clone() * p.split.class_a - capped_a;
        let overflow_b = leftover.clone() * p.split.class_b - capped_b;
        let reassigned_a = model.add_nonneg(tag("reassigned_a"));
        let reassigned_b = model.add_nonneg(tag("reassigned_b"));
        model.add_min(
            tag("reassigned_a"),
            reassigned_a,
            vec![overflow_b, head(caps.class_a, prev.class_a) - capped_a],
        );
        model.add_min(
            tag("reassigned_b"),
            reassigned_b,
            vec![overflow_a, head(caps.class_b, prev.class_b) - capped_b],
        );

        let fill_a = model.add_nonneg(tag("fill_a"));
        let fill_b = model.add_nonneg(tag("fill_b"));
        model.add_eq(tag("fill_a"), fill_a, LinExpr::var(capped_a) + reassigned_a);
        model.add_eq(tag("fill_b"), fill_b, LinExpr::var(capped_b) + reassigned_b);

        let spill = model.add_nonneg(tag("spill"));
        model.add_max(
            tag("spill"),
            spill,
            vec![
                LinExpr::zero(),
                leftover - head(caps.class_a, prev.class_a) - head(caps.class_b, prev.class_b),
            ],
        );

        // Human consumption leaves the reserve before any support
        let human = model.add_nonneg(tag("human"));
        if p.human.schedule == HumanDrawSchedule::MonthlyFractions {
            model.add_eq(tag("human"), human, frame.human_target);
        }
        let reserve_available = model.add_nonneg(tag("reserve_avail"));
        model.add_eq(
            tag("reserve_avail"),
            reserve_available,
            LinExpr::var(prev.reserve) - losses.reserve + fill_reserve - human,
        );

        // Delivery per class
        let eps = p.empty_epsilon_hm3;
        let class_a = self.add_class(
            model,
            ShareClass::A,
            &tag,
            ClassTerms {
                prev: prev.class_a,
                capped: capped_a,
                reassigned: reassigned_a,
                loss: losses.class_a,
                fill: fill_a,
                demand: year.factor_a.demand(frame.nominal_demand_a),
                reserve_available,
                known_state: known_opening.map(|s| PoolState::classify(s.class_a, eps)),
            },
        );
        let class_b = self.add_class(
            model,
            ShareClass::B,
            &tag,
            ClassTerms {
                prev: prev.class_b,
                capped: capped_b,
                reassigned: reassigned_b,
                loss: losses.class_b,
                fill: fill_b,
                demand: year.factor_b.demand(frame.nominal_demand_b),
                reserve_available,
                known_state: known_opening.map(|s| PoolState::classify(s.class_b, eps)),
            },
        );

        // Reserve support: saturate the reserve or the combined need
        let support_total = model.add_nonneg(tag("support_total"));
        model.add_min(
            tag("support_total"),
            support_total,
            vec![
                LinExpr::var(reserve_available),
                LinExpr::sum([class_a.need, class_b.need]),
            ],
        );
        model.add_eq(
            tag("support_split"),
            LinExpr::sum([class_a.support, class_b.support]),
            support_total,
        );

        let closing = PoolVars {
            reserve: model.add_var(tag("stock_r"), 0.0, caps.reserve),
            class_a: model.add_var(tag("stock_a"), 0.0, caps.class_a),
            class_b: model.add_var(tag("stock_b"), 0.0, caps.class_b),
        };
        model.add_eq(
            tag("balance_r"),
            closing.reserve,
            LinExpr::var(reserve_available) - support_total,
        );
        model.add_eq(
            tag("balance_a"),
            closing.class_a,
            LinExpr::var(prev.class_a) - losses.class_a + fill_a - class_a.own,
        );
        model.add_eq(
            tag("balance_b"),
            closing.class_b,
            LinExpr::var(prev.class_b) - losses.class_b + fill_b - class_b.own,
        );

        let turbined = model.add_nonneg(tag("turbined"));
        model.add_eq(
            tag("turbined"),
            turbined,
            LinExpr::sum([
                class_a.own,
                class_a.support,
                class_b.own,
                class_b.support,
                human,
                spill,
            ]),
        );

        let w = &p.objective;
        *objective += LinExpr::sum([class_a.deficit, class_b.deficit])
            + LinExpr::term(support_total, w.support_penalty)
            - LinExpr::sum([class_a.own, class_b.own]) * w.own_reward
            + LinExpr::sum([closing.reserve, closing.class_a, closing.class_b]) * w.stock_penalty;

        StepVars {
            step,
            losses,
            closing,
            fill_reserve,
            spill,
            human,
            reserve_available,
            support_total,
            class_a,
            class_b,
            turbined,
        }
    }

    /// Own delivery, support need and deficit of one class.
    fn add_class(
        &self,
        model: &mut ConstraintModel,
        class: ShareClass,
        tag: &dyn Fn(&str) -> String,
        terms: ClassTerms,
    ) -> ClassVars {
        let p = &self.params;
        let floor = p.support_floor;
        let c = class.to_string().to_lowercase();
        let label = |what: &str| tag(&format!("{}_{}", what, c));

        let available = LinExpr::var(terms.prev) - terms.loss + terms.fill;
        let floor_demand = terms.demand.clone() * floor;

        let own = model.add_nonneg(label("own"));
        model.add_le(label("own_le_avail"), own, available.clone());
        model.add_le(label("own_le_demand"), own, terms.demand.clone());

        let own_floor = match p.own_policy {
            OwnDeliveryPolicy::FloorOnly => {
                let f = model.add_nonneg(label("own_floor"));
                model.add_min(label("own_floor"), f, vec![available, floor_demand.clone()]);
                model.add_le(label("own_ge_floor"), f, own);
                Some(f)
            }
            OwnDeliveryPolicy::MaximalOwn => {
                model.add_min(label("own_max"), own, vec![available, terms.demand.clone()]);
                None
            }
        };

        let need = model.add_nonneg(label("need"));
        model.add_max(
            label("need"),
            need,
            vec![LinExpr::zero(), floor_demand - own],
        );

        let support = model.add_nonneg(label("support"));
        model.add_le(label("support_le_need"), support, need);

        let deficit = model.add_nonneg(label("deficit"));
        model.add_eq(label("deficit"), deficit, terms.demand - own - support);

        // A pool that opened the month empty is served first, up to its share
        // of the reserve: support >= min(need, share * reserve_available)
        let share = p.split.of(class);
        let (empty, empty_floor) = match terms.known_state {
            Some(PoolState::NonEmpty) => (None, None),
            Some(PoolState::Empty) => {
                let g = add_empty_floor(
                    model,
                    label("empty_floor"),
                    need,
                    terms.reserve_available,
                    share,
                );
                model.add_le(label("empty_support"), g, support);
                (None, Some(g))
            }
            None => {
                let flag = model.add_binary(label("empty"));
                let eps = p.empty_epsilon_hm3;
                model.add_indicator(
                    label("empty_on"),
                    flag,
                    true,
                    LinearConstraint::le(terms.prev, eps),
                );
                model.add_indicator(
                    label("empty_off"),
                    flag,
                    false,
                    LinearConstraint::ge(terms.prev, eps),
                );
                let g = add_empty_floor(
                    model,
                    label("empty_floor"),
                    need,
                    terms.reserve_available,
                    share,
                );
                model.add_indicator(
                    label("empty_support"),
                    flag,
                    true,
                    LinearConstraint::compare(support, Sense::Ge, g),
                );
                (Some(flag), Some(g))
            }
        };

        ClassVars {
            capped: terms.capped,
            reassigned: terms.reassigned,
            fill: terms.fill,
            own,
            own_floor,
            need,
            support,
            deficit,
            empty,
            empty_floor,
        }
    }
}

fn add_loss(model: &mut ConstraintModel, name: String, cap: f64, prev: VarId) -> VarId {
    let loss = model.add_nonneg(name.clone());
    if cap <= 0.0 {
        model.add_eq(name, loss, 0.0);
    } else {
        model.add_min(name, loss, vec![LinExpr::constant(cap), LinExpr::var(prev)]);
    }
    loss
}

fn add_empty_floor(
    model: &mut ConstraintModel,
    name: String,
    need: VarId,
    reserve_available: VarId,
    share: f64,
) -> VarId {
    let g = model.add_nonneg(name.clone());
    model.add_min(
        name,
        g,
        vec![LinExpr::var(need), LinExpr::term(reserve_available, share)],
    );
    g
}

fn fix_pools(model: &mut ConstraintModel, name: &str, vars: &PoolVars, stocks: &PoolStocks) {
    model.add_eq(format!("{}:r", name), vars.reserve, stocks.reserve);
    model.add_eq(format!("{}:a", name), vars.class_a, stocks.class_a);
    model.add_eq(format!("{}:b", name), vars.class_b, stocks.class_b);
}

/// Bound on the spread between arguments of any min/max/indicator in the
/// model.
fn big_m(params: &ReservoirParams, frame: &ScenarioFrame) -> f64 {
    let peak = frame
        .months
        .iter()
        .map(|m| m.inflow + m.nominal_demand_a + m.nominal_demand_b + m.loss_caps.total())
        .fold(0.0, f64::max);
    2.0 * (peak + params.capacities.total() + params.human.annual_hm3) + 1.0
}
